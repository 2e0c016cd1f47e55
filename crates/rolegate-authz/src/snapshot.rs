//! Immutable published session state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use time::OffsetDateTime;

use crate::metadata::{FetchReport, FetchedMetadata};
use crate::types::{PermissionMeta, PolicyTriple, ResourceMeta, RoleMeta, SubjectId};

/// Everything a completed cycle published.
///
/// Snapshots are never mutated after publication. Readers hold an `Arc`
/// and keep seeing the same state even while a newer cycle is swapped in.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    ready: bool,
    subject: Option<SubjectId>,
    policies: Arc<[PolicyTriple]>,
    /// resource name -> granted action names, for the snapshot's subject.
    by_resource: HashMap<String, HashSet<String>>,
    resources: Arc<[ResourceMeta]>,
    permissions: Arc<[PermissionMeta]>,
    roles: Arc<[RoleMeta]>,
    cycle: Option<u64>,
    fetch_report: FetchReport,
    compiled_at: Option<OffsetDateTime>,
}

impl PolicySnapshot {
    /// State before any cycle has completed: not ready, no policies.
    #[must_use]
    pub(crate) fn uninitialized() -> Self {
        Self {
            ready: false,
            subject: None,
            policies: Arc::from(Vec::new()),
            by_resource: HashMap::new(),
            resources: Arc::from(Vec::new()),
            permissions: Arc::from(Vec::new()),
            roles: Arc::from(Vec::new()),
            cycle: None,
            fetch_report: FetchReport::default(),
            compiled_at: None,
        }
    }

    /// Placeholder published when cached state is dropped: no policies and
    /// no metadata, for `subject` (the new identity, or none after sign-out).
    #[must_use]
    pub(crate) fn reset(cycle: u64, subject: Option<SubjectId>, ready: bool) -> Self {
        Self {
            ready,
            subject,
            cycle: Some(cycle),
            compiled_at: ready.then(OffsetDateTime::now_utc),
            ..Self::uninitialized()
        }
    }

    /// Ready snapshot built from a compiled cycle.
    ///
    /// Triples belonging to a different subject are not indexed.
    #[must_use]
    pub(crate) fn compiled(
        cycle: u64,
        subject: Option<SubjectId>,
        policies: Vec<PolicyTriple>,
        metadata: FetchedMetadata,
        fetch_report: FetchReport,
    ) -> Self {
        let mut by_resource: HashMap<String, HashSet<String>> = HashMap::new();
        if let Some(subject) = subject.as_deref() {
            for triple in policies.iter().filter(|t| t.subject == subject) {
                by_resource
                    .entry(triple.resource.clone())
                    .or_default()
                    .insert(triple.action.clone());
            }
        }

        Self {
            ready: true,
            subject,
            policies: Arc::from(policies),
            by_resource,
            resources: Arc::from(metadata.resources),
            permissions: Arc::from(metadata.permissions),
            roles: Arc::from(metadata.roles),
            cycle: Some(cycle),
            fetch_report,
            compiled_at: Some(OffsetDateTime::now_utc()),
        }
    }

    /// Decision over this snapshot.
    ///
    /// False unless ready, a non-empty subject is present and the
    /// `(subject, resource, action)` triple exists.
    #[must_use]
    pub fn allows(&self, resource: &str, action: &str) -> bool {
        if !self.ready || resource.is_empty() || action.is_empty() {
            return false;
        }
        if self.subject.as_deref().is_none_or(str::is_empty) {
            return false;
        }
        self.by_resource
            .get(resource)
            .is_some_and(|actions| actions.contains(action))
    }

    /// Actions granted on `resource`, sorted. Empty when not ready.
    #[must_use]
    pub fn actions_for(&self, resource: &str) -> Vec<String> {
        if !self.ready {
            return Vec::new();
        }
        let mut actions: Vec<String> = self
            .by_resource
            .get(resource)
            .map(|a| a.iter().cloned().collect())
            .unwrap_or_default();
        actions.sort();
        actions
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Subject the policies were compiled for.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Compiled triples, in unspecified order.
    #[must_use]
    pub fn policies(&self) -> Arc<[PolicyTriple]> {
        Arc::clone(&self.policies)
    }

    #[must_use]
    pub fn resources(&self) -> Arc<[ResourceMeta]> {
        Arc::clone(&self.resources)
    }

    #[must_use]
    pub fn permissions(&self) -> Arc<[PermissionMeta]> {
        Arc::clone(&self.permissions)
    }

    #[must_use]
    pub fn roles(&self) -> Arc<[RoleMeta]> {
        Arc::clone(&self.roles)
    }

    /// Refresh token of the cycle that produced this snapshot.
    #[must_use]
    pub fn cycle(&self) -> Option<u64> {
        self.cycle
    }

    /// Metadata categories that failed during the producing cycle.
    ///
    /// A non-empty report means some denials may be "unknown" rather than
    /// "not granted"; consumers can offer a retry.
    #[must_use]
    pub fn fetch_report(&self) -> &FetchReport {
        &self.fetch_report
    }

    #[must_use]
    pub fn compiled_at(&self) -> Option<OffsetDateTime> {
        self.compiled_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(subject: Option<&str>, policies: Vec<PolicyTriple>) -> PolicySnapshot {
        PolicySnapshot::compiled(
            1,
            subject.map(String::from),
            policies,
            FetchedMetadata::default(),
            FetchReport::default(),
        )
    }

    #[test]
    fn test_uninitialized_denies_everything() {
        let snapshot = PolicySnapshot::uninitialized();
        assert!(!snapshot.is_ready());
        assert!(!snapshot.allows("User Management", "read"));
        assert_eq!(snapshot.cycle(), None);
    }

    #[test]
    fn test_existential_match() {
        let snapshot = compiled(Some("u"), vec![PolicyTriple::new("u", "R", "write")]);
        assert!(snapshot.allows("R", "write"));
        assert!(!snapshot.allows("R", "read"));
        assert!(!snapshot.allows("X", "write"));
    }

    #[test]
    fn test_empty_inputs_are_denied() {
        let snapshot = compiled(Some("u"), vec![PolicyTriple::new("u", "R", "write")]);
        assert!(!snapshot.allows("", "write"));
        assert!(!snapshot.allows("R", ""));
    }

    #[test]
    fn test_missing_subject_is_denied() {
        let snapshot = compiled(None, vec![PolicyTriple::new("u", "R", "write")]);
        assert!(snapshot.is_ready());
        assert!(!snapshot.allows("R", "write"));

        let snapshot = compiled(Some(""), vec![PolicyTriple::new("", "R", "write")]);
        assert!(!snapshot.allows("R", "write"));
    }

    #[test]
    fn test_foreign_subject_triples_are_ignored() {
        let snapshot = compiled(Some("u1"), vec![PolicyTriple::new("u2", "R", "write")]);
        assert!(!snapshot.allows("R", "write"));
    }

    #[test]
    fn test_actions_for() {
        let snapshot = compiled(
            Some("u"),
            vec![
                PolicyTriple::new("u", "R", "write"),
                PolicyTriple::new("u", "R", "read"),
                PolicyTriple::new("u", "R", "read"),
            ],
        );
        assert_eq!(snapshot.actions_for("R"), vec!["read", "write"]);
        assert!(snapshot.actions_for("X").is_empty());
    }

    #[test]
    fn test_reset_snapshots() {
        let pending = PolicySnapshot::reset(4, None, false);
        assert!(!pending.is_ready());
        assert_eq!(pending.cycle(), Some(4));
        assert!(pending.compiled_at().is_none());

        let switched = PolicySnapshot::reset(5, Some("u2".to_string()), true);
        assert!(switched.is_ready());
        assert_eq!(switched.subject(), Some("u2"));
        assert!(!switched.allows("R", "read"));

        let signed_out = PolicySnapshot::reset(5, None, true);
        assert!(signed_out.is_ready());
        assert!(signed_out.policies().is_empty());
        assert!(!signed_out.allows("R", "read"));
    }
}
