//! REST client configuration.

use std::time::Duration;

use rolegate_authz::ConfigError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Where and how to fetch console metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Console backend base URL (e.g. `https://console.example.com`).
    pub base_url: String,

    /// Path of the resource list endpoint.
    pub resources_path: String,

    /// Path of the permission list endpoint.
    pub permissions_path: String,

    /// Path of the role list endpoint.
    pub roles_path: String,

    /// HTTP request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            resources_path: "/api/resources".to_string(),
            permissions_path: "/api/permissions".to_string(),
            roles_path: "/api/roles".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for the given base URL with default paths.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the three endpoint paths.
    #[must_use]
    pub fn with_paths(
        mut self,
        resources: impl Into<String>,
        permissions: impl Into<String>,
        roles: impl Into<String>,
    ) -> Self {
        self.resources_path = resources.into();
        self.permissions_path = permissions.into();
        self.roles_path = roles.into();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the base URL is not an
    /// absolute http(s) URL, a path does not start with `/`, or the
    /// timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            ConfigError::InvalidValue(format!("base_url '{}': {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(format!(
                "base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        for (name, path) in [
            ("resources_path", &self.resources_path),
            ("permissions_path", &self.permissions_path),
            ("roles_path", &self.roles_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must start with '/', got '{path}'"
                )));
            }
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "request_timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
