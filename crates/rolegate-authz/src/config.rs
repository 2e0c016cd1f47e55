//! Permission session configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [session]
//! fetch_timeout = "10s"
//! refresh_interval = "5m"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`PermissionSession`](crate::PermissionSession).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound for each individual metadata fetch.
    /// A fetch that takes longer is treated as failed (empty result).
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,

    /// Interval for background refreshes started with
    /// `spawn_periodic_refresh`. Zero disables periodic refresh.
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            refresh_interval: Duration::ZERO,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with periodic refresh enabled.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the per-fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Configuration for tests: short timeout, no periodic refresh.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            fetch_timeout: Duration::from_millis(200),
            refresh_interval: Duration::ZERO,
        }
    }

    /// Returns `true` if periodic refresh is configured.
    #[must_use]
    pub fn periodic_refresh_enabled(&self) -> bool {
        !self.refresh_interval.is_zero()
    }

    /// Parse a configuration from a TOML document.
    ///
    /// Reads the `[session]` section when the document has one, otherwise
    /// the top-level keys. Keys that are not session settings are ignored,
    /// so a whole application config file can be passed in.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the document is not valid TOML for
    /// this structure, or a validation error.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct Wrapper {
            session: Option<SessionConfig>,
        }

        let table: toml::Table =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let config = if table.contains_key("session") {
            toml::from_str::<Wrapper>(source)
                .map_err(|e| ConfigError::Parse(e.to_string()))?
                .session
                .unwrap_or_default()
        } else {
            toml::from_str::<SessionConfig>(source)
                .map_err(|e| ConfigError::Parse(e.to_string()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the fetch timeout is zero, or
    /// if periodic refresh is enabled with an interval shorter than one second.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "fetch_timeout must be > 0".to_string(),
            ));
        }

        if self.periodic_refresh_enabled() && self.refresh_interval < Duration::from_secs(1) {
            return Err(ConfigError::InvalidValue(
                "refresh_interval must be at least 1s (or 0 to disable)".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The configuration source could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}
