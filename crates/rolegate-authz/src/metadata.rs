//! Metadata fetch seam.
//!
//! A [`MetadataSource`] supplies the resource, permission and role lists the
//! compiler resolves grant identifiers against. [`fetch_all`] runs the three
//! fetches concurrently and degrades each failure to an empty list.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::AuthzResult;
use crate::error::{AuthzError, MetadataCategory};
use crate::types::{PermissionMeta, ResourceMeta, RoleMeta};

/// Read-only access to the console's resource, permission and role lists.
///
/// Each operation may fail on its own. `credential` is the subject
/// identity, sent as the bearer credential when present.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch all resources.
    async fn fetch_resources(&self, credential: Option<&str>) -> AuthzResult<Vec<ResourceMeta>>;

    /// Fetch all permissions.
    async fn fetch_permissions(&self, credential: Option<&str>)
    -> AuthzResult<Vec<PermissionMeta>>;

    /// Fetch all roles.
    async fn fetch_roles(&self, credential: Option<&str>) -> AuthzResult<Vec<RoleMeta>>;
}

/// Metadata gathered by one fetch round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchedMetadata {
    pub resources: Vec<ResourceMeta>,
    pub permissions: Vec<PermissionMeta>,
    pub roles: Vec<RoleMeta>,
}

/// Which categories failed in a fetch round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Categories that failed or timed out and were replaced by empty lists.
    pub failed: Vec<MetadataCategory>,
}

impl FetchReport {
    /// Returns `true` if every category was fetched.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Returns `true` if the given category failed.
    #[must_use]
    pub fn has_failed(&self, category: MetadataCategory) -> bool {
        self.failed.contains(&category)
    }
}

/// Fetch resources, permissions and roles concurrently.
///
/// Each fetch is bounded by `timeout`. A failed or timed-out fetch is logged
/// and replaced by an empty list; it never affects the other two.
pub async fn fetch_all(
    source: &dyn MetadataSource,
    credential: Option<&str>,
    timeout: Duration,
) -> (FetchedMetadata, FetchReport) {
    let (resources, permissions, roles) = tokio::join!(
        bounded(
            MetadataCategory::Resources,
            timeout,
            source.fetch_resources(credential)
        ),
        bounded(
            MetadataCategory::Permissions,
            timeout,
            source.fetch_permissions(credential)
        ),
        bounded(MetadataCategory::Roles, timeout, source.fetch_roles(credential)),
    );

    let mut report = FetchReport::default();
    let metadata = FetchedMetadata {
        resources: settle(MetadataCategory::Resources, resources, &mut report),
        permissions: settle(MetadataCategory::Permissions, permissions, &mut report),
        roles: settle(MetadataCategory::Roles, roles, &mut report),
    };

    (metadata, report)
}

async fn bounded<T>(
    category: MetadataCategory,
    timeout: Duration,
    fetch: impl Future<Output = AuthzResult<Vec<T>>>,
) -> AuthzResult<Vec<T>> {
    match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(AuthzError::Timeout { category }),
    }
}

fn settle<T>(
    category: MetadataCategory,
    result: AuthzResult<Vec<T>>,
    report: &mut FetchReport,
) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(category = %category, error = %e, "Metadata fetch failed, using empty list");
            report.failed.push(category);
            Vec::new()
        }
    }
}

// =============================================================================
// Static source
// =============================================================================

/// Metadata source serving fixed lists. Never fails.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataSource {
    metadata: FetchedMetadata,
}

impl StaticMetadataSource {
    #[must_use]
    pub fn new(
        resources: Vec<ResourceMeta>,
        permissions: Vec<PermissionMeta>,
        roles: Vec<RoleMeta>,
    ) -> Self {
        Self {
            metadata: FetchedMetadata {
                resources,
                permissions,
                roles,
            },
        }
    }

    /// Parse a `{ "resources": [..], "permissions": [..], "roles": [..] }`
    /// document. Missing lists default to empty.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Configuration` if the document is not valid JSON
    /// for that shape.
    pub fn from_json(source: &str) -> AuthzResult<Self> {
        let metadata: FetchedMetadata = serde_json::from_str(source)
            .map_err(|e| AuthzError::configuration(format!("invalid metadata document: {e}")))?;
        Ok(Self { metadata })
    }
}

#[async_trait]
impl MetadataSource for StaticMetadataSource {
    async fn fetch_resources(&self, _credential: Option<&str>) -> AuthzResult<Vec<ResourceMeta>> {
        Ok(self.metadata.resources.clone())
    }

    async fn fetch_permissions(
        &self,
        _credential: Option<&str>,
    ) -> AuthzResult<Vec<PermissionMeta>> {
        Ok(self.metadata.permissions.clone())
    }

    async fn fetch_roles(&self, _credential: Option<&str>) -> AuthzResult<Vec<RoleMeta>> {
        Ok(self.metadata.roles.clone())
    }
}
