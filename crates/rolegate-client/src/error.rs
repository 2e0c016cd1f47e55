//! REST client errors.

use rolegate_authz::{AuthzError, MetadataCategory};

/// Errors that can occur while fetching console metadata over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A network error occurred (connection, TLS, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// The server returned a non-success status code.
    #[error("HTTP error: status {0}")]
    Http(u16),

    /// The response body could not be parsed.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Converts into the session's metadata error for `category`.
    #[must_use]
    pub fn into_authz(self, category: MetadataCategory) -> AuthzError {
        AuthzError::metadata(category, self.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http(status.as_u16())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_authz_keeps_category() {
        let err = ClientError::Http(503).into_authz(MetadataCategory::Roles);
        assert_eq!(err.category(), Some(MetadataCategory::Roles));
        assert!(err.is_transient());
        assert!(err.to_string().contains("status 503"));
    }
}
