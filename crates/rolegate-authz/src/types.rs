//! Data model shared by the compiler, the session and its collaborators.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Opaque subject identity.
///
/// This is the raw bearer credential issued at login. It is also the
/// subject key of every compiled [`PolicyTriple`].
pub type SubjectId = String;

/// Server-issued permission grant.
///
/// Maps a resource identifier to the permission identifiers granted on it.
/// Identifiers may repeat and need not exist in the fetched metadata.
pub type RawGrant = BTreeMap<String, Vec<String>>;

// =============================================================================
// Metadata
// =============================================================================

/// A resource known to the console backend (e.g. "User Management").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceMeta {
    /// Backend identifier referenced by grants.
    pub id: String,

    /// Display name; this is what `can` is queried with.
    pub name: String,

    /// Grouping used by the console navigation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ResourceMeta {
    /// Create a resource entry with no category.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: None,
        }
    }

    /// Set the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// A permission (action) known to the console backend (e.g. "read").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionMeta {
    /// Backend identifier referenced by grants.
    pub id: String,

    /// Action name; this is what `can` is queried with.
    pub name: String,

    /// Description shown next to the permission in role editors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PermissionMeta {
    /// Create a permission entry.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }
}

/// A role record, exposed for rendering only.
///
/// Roles never take part in the decision path; the grant is already
/// flattened per subject by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMeta {
    /// Backend identifier.
    pub id: String,

    /// Role name (e.g. "admin").
    pub name: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Permission identifiers attached to the role.
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl RoleMeta {
    /// Create a role with no permissions.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            permissions: Vec::new(),
        }
    }

    /// Attach a permission identifier.
    #[must_use]
    pub fn add_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }
}

// =============================================================================
// Policy Triple
// =============================================================================

/// One compiled policy row: `subject` may perform `action` on `resource`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyTriple {
    /// Subject identity the row was compiled for.
    pub subject: SubjectId,

    /// Resource display name.
    pub resource: String,

    /// Action (permission) name.
    pub action: String,
}

impl PolicyTriple {
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }
}

impl std::fmt::Display for PolicyTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p, {}, {}, {}", self.subject, self.resource, self.action)
    }
}
