//! Grant store: where the subject identity and raw grant live between sessions.
//!
//! The login flow writes the store; a [`PermissionSession`](crate::PermissionSession)
//! only reads it at the start of each cycle (and writes it on
//! `switch_subject` / `sign_out`).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::AuthzResult;
use crate::error::AuthzError;
use crate::types::{RawGrant, SubjectId};

/// Storage for the subject identity and raw grant.
///
/// The identity and its grant are read and written together through
/// [`load`](Self::load) and [`save`](Self::save); the per-field methods are
/// conveniences built on top of them. `None` means "not present", which the
/// session treats as a normal zero-permission state.
///
/// Implementations may block (e.g. on file I/O). Refresh cycles call
/// [`load`](Self::load) on tokio's blocking pool; `switch_subject` and
/// `sign_out` write on the caller's thread.
pub trait GrantStore: Send + Sync {
    /// Read the subject identity and grant in one operation.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::GrantStore` if the backing storage cannot be read.
    fn load(&self) -> AuthzResult<StoredGrant>;

    /// Replace the subject identity and grant in one operation.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::GrantStore` if the backing storage cannot be written.
    fn save(&self, stored: &StoredGrant) -> AuthzResult<()>;

    /// Read the stored subject identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::GrantStore` if the backing storage cannot be read.
    fn subject_id(&self) -> AuthzResult<Option<SubjectId>> {
        Ok(self.load()?.subject_id)
    }

    /// Read the stored raw grant.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::GrantStore` if the backing storage cannot be read.
    fn raw_grant(&self) -> AuthzResult<Option<RawGrant>> {
        Ok(self.load()?.grant)
    }

    /// Replace the stored subject identity, keeping the grant.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::GrantStore` if the backing storage cannot be written.
    fn set_subject_id(&self, subject: Option<SubjectId>) -> AuthzResult<()> {
        let mut stored = self.load()?;
        stored.subject_id = subject;
        self.save(&stored)
    }

    /// Replace the stored raw grant, keeping the subject identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::GrantStore` if the backing storage cannot be written.
    fn set_raw_grant(&self, grant: Option<RawGrant>) -> AuthzResult<()> {
        let mut stored = self.load()?;
        stored.grant = grant;
        self.save(&stored)
    }

    /// Remove both the subject identity and the grant.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::GrantStore` if the backing storage cannot be written.
    fn clear(&self) -> AuthzResult<()> {
        self.save(&StoredGrant::default())
    }
}

/// What a grant store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGrant {
    /// Subject identity (bearer credential).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<SubjectId>,

    /// Raw grant issued with it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant: Option<RawGrant>,
}

impl StoredGrant {
    /// A subject together with its grant.
    #[must_use]
    pub fn new(subject: impl Into<String>, grant: RawGrant) -> Self {
        Self {
            subject_id: Some(subject.into()),
            grant: Some(grant),
        }
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local grant store.
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    inner: RwLock<StoredGrant>,
}

impl InMemoryGrantStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with a subject and grant.
    #[must_use]
    pub fn with_grant(subject: impl Into<String>, grant: RawGrant) -> Self {
        Self {
            inner: RwLock::new(StoredGrant::new(subject, grant)),
        }
    }
}

impl GrantStore for InMemoryGrantStore {
    fn load(&self) -> AuthzResult<StoredGrant> {
        self.inner
            .read()
            .map(|stored| stored.clone())
            .map_err(|_| AuthzError::grant_store("in-memory grant store lock poisoned"))
    }

    fn save(&self, stored: &StoredGrant) -> AuthzResult<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| AuthzError::grant_store("in-memory grant store lock poisoned"))?;
        *guard = stored.clone();
        Ok(())
    }
}

// =============================================================================
// File store
// =============================================================================

/// Grant store backed by a JSON file.
///
/// A missing file reads as an empty store. Every read goes to disk, so
/// changes made by another process (e.g. a second `login`) are picked up
/// on the next refresh.
#[derive(Debug, Clone)]
pub struct FileGrantStore {
    path: PathBuf,
}

impl FileGrantStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GrantStore for FileGrantStore {
    fn load(&self) -> AuthzResult<StoredGrant> {
        if !self.path.exists() {
            return Ok(StoredGrant::default());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            AuthzError::grant_store(format!("failed to read {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AuthzError::grant_store(format!("failed to parse {}: {e}", self.path.display()))
        })
    }

    /// Writes the whole record, creating parent directories.
    fn save(&self, stored: &StoredGrant) -> AuthzResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AuthzError::grant_store(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let content = serde_json::to_string_pretty(stored)
            .map_err(|e| AuthzError::grant_store(format!("failed to encode grant: {e}")))?;
        fs::write(&self.path, content).map_err(|e| {
            AuthzError::grant_store(format!("failed to write {}: {e}", self.path.display()))
        })
    }

    fn clear(&self) -> AuthzResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                AuthzError::grant_store(format!("failed to remove {}: {e}", self.path.display()))
            })?;
        }
        Ok(())
    }
}
