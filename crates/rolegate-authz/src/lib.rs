//! # rolegate-authz
//!
//! Client-side permission evaluation for the Rolegate admin console.
//!
//! This crate provides:
//! - Compilation of a raw identifier grant into named `(subject, resource, action)` policies
//! - A permission session answering `can(resource, action)` without blocking
//! - Concurrent, failure-tolerant metadata fetching
//! - Grant storage (in-memory and JSON file)
//!
//! ## Overview
//!
//! At login the backend issues a grant mapping resource IDs to permission
//! IDs. The console never sees names in the grant, so every refresh cycle
//! fetches the resource and permission catalogs and resolves the grant
//! against them. The result is published as an immutable
//! [`PolicySnapshot`] that UI code queries synchronously.
//!
//! Decisions are fail-closed: before the first cycle completes, without a
//! subject, or for anything the grant does not name, `can` returns `false`.
//! These decisions are advisory; the backend enforces authorization.
//!
//! ## Modules
//!
//! - [`compiler`] - Grant to policy compilation
//! - [`config`] - Session configuration
//! - [`error`] - Error types
//! - [`grant_store`] - Subject identity and grant storage
//! - [`metadata`] - Metadata source trait and concurrent fetch
//! - [`session`] - The permission session
//! - [`snapshot`] - Published session state
//! - [`types`] - Metadata records and policy triples

pub mod compiler;
pub mod config;
pub mod error;
pub mod grant_store;
pub mod metadata;
pub mod session;
pub mod snapshot;
pub mod types;

pub use compiler::{CompileReport, PolicyCompiler};
pub use config::{ConfigError, SessionConfig};
pub use error::{AuthzError, MetadataCategory};
pub use grant_store::{FileGrantStore, GrantStore, InMemoryGrantStore, StoredGrant};
pub use metadata::{
    FetchReport, FetchedMetadata, MetadataSource, StaticMetadataSource, fetch_all,
};
pub use session::{CycleOutcome, PermissionSession, SessionState, SessionStats};
pub use snapshot::PolicySnapshot;
pub use types::{PermissionMeta, PolicyTriple, RawGrant, ResourceMeta, RoleMeta, SubjectId};

/// Type alias for authorization results.
pub type AuthzResult<T> = Result<T, AuthzError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use rolegate_authz::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthzResult;
    pub use crate::config::{ConfigError, SessionConfig};
    pub use crate::error::{AuthzError, MetadataCategory};
    pub use crate::grant_store::{FileGrantStore, GrantStore, InMemoryGrantStore};
    pub use crate::metadata::{MetadataSource, StaticMetadataSource};
    pub use crate::session::{CycleOutcome, PermissionSession, SessionState};
    pub use crate::snapshot::PolicySnapshot;
    pub use crate::types::{PermissionMeta, PolicyTriple, RawGrant, ResourceMeta, RoleMeta};
}
