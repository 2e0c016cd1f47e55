//! Authorization error types.
//!
//! None of these errors ever reach the decision interface. The session
//! absorbs them and publishes fewer permissions instead; they exist so that
//! collaborators can report what went wrong and so the session can log it.

use std::fmt;

/// Metadata category fetched from the console backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataCategory {
    /// Resource metadata (`id`, `name`, `category`).
    Resources,
    /// Permission metadata (`id`, `name`).
    Permissions,
    /// Role records.
    Roles,
}

impl MetadataCategory {
    /// All categories, in fetch order.
    pub const ALL: [MetadataCategory; 3] = [Self::Resources, Self::Permissions, Self::Roles];

    /// Returns the lowercase category name used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resources => "resources",
            Self::Permissions => "permissions",
            Self::Roles => "roles",
        }
    }
}

impl fmt::Display for MetadataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the collaborators of a permission session.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// The grant store could not be read or written.
    #[error("Grant store error: {message}")]
    GrantStore {
        /// Description of the store failure.
        message: String,
    },

    /// A metadata fetch failed (network error, non-2xx response, bad payload).
    #[error("Metadata fetch failed for {category}: {message}")]
    Metadata {
        /// Which metadata category failed.
        category: MetadataCategory,
        /// Description of the failure.
        message: String,
    },

    /// A metadata fetch did not complete within the configured timeout.
    #[error("Metadata fetch timed out for {category}")]
    Timeout {
        /// Which metadata category timed out.
        category: MetadataCategory,
    },

    /// The session configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl AuthzError {
    /// Creates a new `GrantStore` error.
    #[must_use]
    pub fn grant_store(message: impl Into<String>) -> Self {
        Self::GrantStore {
            message: message.into(),
        }
    }

    /// Creates a new `Metadata` error.
    #[must_use]
    pub fn metadata(category: MetadataCategory, message: impl Into<String>) -> Self {
        Self::Metadata {
            category,
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns the metadata category this error belongs to, if any.
    #[must_use]
    pub fn category(&self) -> Option<MetadataCategory> {
        match self {
            Self::Metadata { category, .. } | Self::Timeout { category } => Some(*category),
            Self::GrantStore { .. } | Self::Configuration { .. } => None,
        }
    }

    /// Returns `true` if retrying the same operation later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Metadata { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthzError::grant_store("file is not valid JSON");
        assert_eq!(err.to_string(), "Grant store error: file is not valid JSON");

        let err = AuthzError::metadata(MetadataCategory::Permissions, "HTTP 503");
        assert_eq!(
            err.to_string(),
            "Metadata fetch failed for permissions: HTTP 503"
        );

        let err = AuthzError::Timeout {
            category: MetadataCategory::Roles,
        };
        assert_eq!(err.to_string(), "Metadata fetch timed out for roles");
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthzError::metadata(MetadataCategory::Resources, "x").category(),
            Some(MetadataCategory::Resources)
        );
        assert_eq!(AuthzError::configuration("x").category(), None);
    }

    #[test]
    fn test_transient_errors() {
        assert!(AuthzError::metadata(MetadataCategory::Resources, "x").is_transient());
        assert!(
            AuthzError::Timeout {
                category: MetadataCategory::Resources
            }
            .is_transient()
        );
        assert!(!AuthzError::grant_store("x").is_transient());
        assert!(!AuthzError::configuration("x").is_transient());
    }
}
