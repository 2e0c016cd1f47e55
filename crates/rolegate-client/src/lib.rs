//! # rolegate-client
//!
//! REST implementation of the Rolegate metadata source.
//!
//! [`RestMetadataSource`] fetches the resource, permission and role lists
//! from the console backend and plugs into a
//! [`PermissionSession`](rolegate_authz::PermissionSession):
//!
//! ```ignore
//! use std::sync::Arc;
//! use rolegate_authz::{FileGrantStore, PermissionSession, SessionConfig};
//! use rolegate_client::{ClientConfig, RestMetadataSource};
//!
//! let source = RestMetadataSource::new(ClientConfig::new("https://console.example.com"))?;
//! let session = PermissionSession::mount(
//!     Arc::new(FileGrantStore::new("grant.json")),
//!     Arc::new(source),
//!     SessionConfig::default(),
//! );
//! ```

pub mod config;
pub mod error;
pub mod source;

pub use config::ClientConfig;
pub use error::ClientError;
pub use source::RestMetadataSource;

/// Type alias for REST client results.
pub type ClientResult<T> = Result<T, ClientError>;
