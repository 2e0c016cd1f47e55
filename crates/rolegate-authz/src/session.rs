//! Permission session: the decision interface consumed by the console.
//!
//! A session owns the published [`PolicySnapshot`] and the refresh token
//! that orders fetch-and-compile cycles.
//!
//! # Cycles
//!
//! Every cycle takes the next refresh token (the initial mount is cycle 0),
//! reads the grant store, fetches metadata concurrently, compiles, and then
//! publishes, but only if no newer cycle has started in the meantime.
//! Results of superseded cycles are dropped on arrival; in-flight requests
//! are never aborted.
//!
//! Readers always see a complete snapshot. During a refresh they keep
//! seeing the previous one, so `is_ready` never flickers back to false.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rolegate_authz::{FileGrantStore, PermissionSession, SessionConfig};
//!
//! let session = PermissionSession::mount(
//!     Arc::new(FileGrantStore::new(path)),
//!     Arc::new(rest_metadata_source),
//!     SessionConfig::default(),
//! );
//!
//! session.wait_until_ready().await;
//! if session.can("User Management", "write") {
//!     // render the "New user" button
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::AuthzResult;
use crate::compiler::PolicyCompiler;
use crate::config::SessionConfig;
use crate::grant_store::{GrantStore, StoredGrant};
use crate::metadata::{MetadataSource, fetch_all};
use crate::snapshot::PolicySnapshot;
use crate::types::{PermissionMeta, RawGrant, ResourceMeta, RoleMeta, SubjectId};

/// Lifecycle state of a session, as seen by its owner.
///
/// Consumers of the decision interface should rely on `is_ready` instead:
/// a refresh moves the state to `Compiling` while readers still see the
/// previous ready snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No cycle has started.
    Uninitialized,
    /// The most recent cycle has not published yet.
    Compiling,
    /// The most recent cycle has published.
    Ready,
}

/// Result of a single fetch-and-compile cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle's snapshot is now the published one.
    Published {
        /// Refresh token of the cycle.
        cycle: u64,
    },
    /// A newer cycle started first; results were dropped.
    Discarded {
        /// Refresh token of the cycle.
        cycle: u64,
    },
}

impl CycleOutcome {
    #[must_use]
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }

    #[must_use]
    pub fn cycle(&self) -> u64 {
        match self {
            Self::Published { cycle } | Self::Discarded { cycle } => *cycle,
        }
    }
}

/// Counters about a session's cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Fetch-and-compile cycles started (including the initial mount).
    /// Identity resets are not cycles and are not counted.
    pub cycles_started: u64,
    /// Cycles whose snapshot was published.
    pub cycles_published: u64,
    /// Cycles dropped because a newer one had started.
    pub cycles_discarded: u64,
    /// Individual metadata fetches that failed or timed out.
    pub fetch_failures: u64,
}

// =============================================================================
// Shared state
// =============================================================================

struct SessionInner {
    grants: Arc<dyn GrantStore>,
    metadata: Arc<dyn MetadataSource>,
    config: SessionConfig,

    /// Published state; replaced wholesale, never mutated.
    snapshot: ArcSwap<PolicySnapshot>,

    /// Number of refresh tokens handed out. The current token is `tokens - 1`.
    tokens: AtomicU64,

    /// Serializes the token check with the snapshot store.
    publish_lock: Mutex<()>,

    /// Cycle number of the last published snapshot.
    published: watch::Sender<u64>,

    cycles_started: AtomicU64,
    cycles_published: AtomicU64,
    cycles_discarded: AtomicU64,
    fetch_failures: AtomicU64,
}

impl SessionInner {
    fn next_token(&self) -> u64 {
        self.tokens.fetch_add(1, Ordering::SeqCst)
    }

    /// Take the refresh token for a new fetch-and-compile cycle.
    fn begin_cycle(&self) -> u64 {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
        self.next_token()
    }

    fn is_current(&self, token: u64) -> bool {
        self.tokens.load(Ordering::SeqCst) == token + 1
    }

    async fn run_cycle(&self, token: u64) -> CycleOutcome {
        let StoredGrant { subject_id, grant } = self.read_store().await;
        let subject = subject_id.filter(|s| !s.is_empty());

        let (metadata, report) =
            fetch_all(&*self.metadata, subject.as_deref(), self.config.fetch_timeout).await;
        self.fetch_failures
            .fetch_add(report.failed.len() as u64, Ordering::Relaxed);

        if !self.is_current(token) {
            return self.discard(token);
        }

        let (policies, compile_report) = PolicyCompiler::compile_with_report(
            subject.as_deref().unwrap_or_default(),
            &grant.unwrap_or_default(),
            &metadata.resources,
            &metadata.permissions,
        );

        tracing::debug!(
            cycle = token,
            emitted = compile_report.emitted,
            skipped_resources = compile_report.skipped_resources,
            skipped_permissions = compile_report.skipped_permissions,
            "Grant compiled"
        );

        let snapshot = PolicySnapshot::compiled(token, subject, policies, metadata, report);
        self.publish(token, snapshot)
    }

    fn publish(&self, token: u64, snapshot: PolicySnapshot) -> CycleOutcome {
        let _guard = self
            .publish_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !self.is_current(token) {
            return self.discard(token);
        }

        let policies = snapshot.policies().len();
        let degraded = snapshot.fetch_report().failed.len();
        self.snapshot.store(Arc::new(snapshot));
        self.published.send_replace(token);
        self.cycles_published.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            cycle = token,
            policies,
            degraded_categories = degraded,
            "Permission snapshot published"
        );

        CycleOutcome::Published { cycle: token }
    }

    fn discard(&self, token: u64) -> CycleOutcome {
        self.cycles_discarded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            cycle = token,
            current = self.tokens.load(Ordering::SeqCst).saturating_sub(1),
            "Stale permission cycle discarded"
        );
        CycleOutcome::Discarded { cycle: token }
    }

    /// Invalidate every in-flight cycle and publish a snapshot with no
    /// policies for `subject`.
    ///
    /// With `ready: None` the current readiness is kept, so a ready session
    /// never observably returns to not-ready.
    fn reset(&self, subject: Option<SubjectId>, ready: Option<bool>) -> u64 {
        let _guard = self
            .publish_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let ready = ready.unwrap_or_else(|| self.snapshot.load().is_ready());
        let token = self.next_token();
        self.snapshot
            .store(Arc::new(PolicySnapshot::reset(token, subject, ready)));
        self.published.send_replace(token);
        token
    }

    /// Read identity and grant in one store call, off the async worker.
    async fn read_store(&self) -> StoredGrant {
        let grants = Arc::clone(&self.grants);
        match tokio::task::spawn_blocking(move || grants.load()).await {
            Ok(Ok(stored)) => stored,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to read grant store, treating as absent");
                StoredGrant::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Grant store read task failed, treating as absent");
                StoredGrant::default()
            }
        }
    }
}

// =============================================================================
// Permission Session
// =============================================================================

/// Client-side permission session.
///
/// Cheap to clone; clones share state. All decision methods are
/// synchronous, lock-free and never fail: anything that goes wrong while
/// building the policy set results in fewer permissions, not an error.
///
/// This is advisory UI gating only. The backend enforces authorization.
#[derive(Clone)]
pub struct PermissionSession {
    inner: Arc<SessionInner>,
}

impl PermissionSession {
    /// Create a session without starting any cycle.
    #[must_use]
    pub fn new(
        grants: Arc<dyn GrantStore>,
        metadata: Arc<dyn MetadataSource>,
        config: SessionConfig,
    ) -> Self {
        let (published, _) = watch::channel(0);
        Self {
            inner: Arc::new(SessionInner {
                grants,
                metadata,
                config,
                snapshot: ArcSwap::from_pointee(PolicySnapshot::uninitialized()),
                tokens: AtomicU64::new(0),
                publish_lock: Mutex::new(()),
                published,
                cycles_started: AtomicU64::new(0),
                cycles_published: AtomicU64::new(0),
                cycles_discarded: AtomicU64::new(0),
                fetch_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Create a session and start the initial cycle (cycle 0).
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn mount(
        grants: Arc<dyn GrantStore>,
        metadata: Arc<dyn MetadataSource>,
        config: SessionConfig,
    ) -> Self {
        let session = Self::new(grants, metadata, config);
        session.refresh_permissions();
        session
    }

    // -------------------------------------------------------------------------
    // Decision interface
    // -------------------------------------------------------------------------

    /// Returns `true` once a cycle has completed and published.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.snapshot.load().is_ready()
    }

    /// Whether the current subject may perform `action` on `resource`.
    ///
    /// Always `false` before the session is ready, without a subject, or
    /// for empty arguments.
    #[must_use]
    pub fn can(&self, resource: &str, action: &str) -> bool {
        self.inner.snapshot.load().allows(resource, action)
    }

    /// Whether any of `actions` is allowed on `resource`.
    #[must_use]
    pub fn can_any(&self, resource: &str, actions: &[&str]) -> bool {
        let snapshot = self.inner.snapshot.load();
        actions.iter().any(|action| snapshot.allows(resource, action))
    }

    /// Whether all of `actions` are allowed on `resource`.
    ///
    /// An empty action list is never allowed.
    #[must_use]
    pub fn can_all(&self, resource: &str, actions: &[&str]) -> bool {
        let snapshot = self.inner.snapshot.load();
        !actions.is_empty() && actions.iter().all(|action| snapshot.allows(resource, action))
    }

    /// Actions granted on `resource`, sorted.
    #[must_use]
    pub fn actions_for(&self, resource: &str) -> Vec<String> {
        self.inner.snapshot.load().actions_for(resource)
    }

    /// Resource metadata from the last published cycle.
    #[must_use]
    pub fn resources(&self) -> Arc<[ResourceMeta]> {
        self.inner.snapshot.load().resources()
    }

    /// Permission metadata from the last published cycle.
    #[must_use]
    pub fn permissions(&self) -> Arc<[PermissionMeta]> {
        self.inner.snapshot.load().permissions()
    }

    /// Role records from the last published cycle.
    #[must_use]
    pub fn roles(&self) -> Arc<[RoleMeta]> {
        self.inner.snapshot.load().roles()
    }

    /// The whole published state (single atomic load).
    #[must_use]
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.inner.snapshot.load_full()
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    /// Schedule a new fetch-and-compile cycle on the current tokio runtime.
    ///
    /// Only the most recently scheduled cycle can publish. Called outside a
    /// runtime, the cycle is dropped and an error is logged.
    pub fn refresh_permissions(&self) {
        let token = self.inner.begin_cycle();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                handle.spawn(async move {
                    inner.run_cycle(token).await;
                });
            }
            Err(_) => {
                tracing::error!(
                    cycle = token,
                    "refresh_permissions called outside a tokio runtime, cycle dropped"
                );
            }
        }
    }

    /// Run a new cycle to completion on the calling task.
    pub async fn refresh(&self) -> CycleOutcome {
        let token = self.inner.begin_cycle();
        self.inner.run_cycle(token).await
    }

    /// Wait until the published snapshot is ready.
    pub async fn wait_until_ready(&self) {
        let mut receiver = self.subscribe();
        loop {
            if self.is_ready() {
                return;
            }
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }

    /// Wait until the most recently started cycle has published.
    ///
    /// Returns immediately when no cycle has started.
    pub async fn wait_until_settled(&self) {
        let mut receiver = self.subscribe();
        while self.state() == SessionState::Compiling {
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }

    /// Receiver notified with the cycle number of each published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.published.subscribe()
    }

    /// Start a background task refreshing at `SessionConfig::refresh_interval`.
    ///
    /// Returns `None` when periodic refresh is disabled. The task stops on
    /// its own once every clone of the session is dropped. Must be called
    /// from within a tokio runtime.
    #[must_use]
    pub fn spawn_periodic_refresh(&self) -> Option<JoinHandle<()>> {
        if !self.inner.config.periodic_refresh_enabled() {
            return None;
        }

        let period = self.inner.config.refresh_interval;
        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately; mount already ran a cycle.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    tracing::debug!("Permission session dropped, stopping periodic refresh");
                    break;
                };
                let token = inner.begin_cycle();
                inner.run_cycle(token).await;
            }
        }))
    }

    // -------------------------------------------------------------------------
    // Identity changes
    // -------------------------------------------------------------------------

    /// Replace the subject identity and grant, then recompile.
    ///
    /// Cached policy state belongs to the previous identity, so it is
    /// dropped immediately and any in-flight cycle is invalidated. Until the
    /// new cycle publishes, the new subject has no permissions; `is_ready`
    /// keeps its current value. Use [`wait_until_settled`](Self::wait_until_settled)
    /// to await the recompiled state.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::GrantStore` if the store cannot be written; the
    /// session state is left untouched in that case.
    pub fn switch_subject(&self, subject: impl Into<String>, grant: RawGrant) -> AuthzResult<()> {
        let stored = StoredGrant::new(subject, grant);
        self.inner.grants.save(&stored)?;

        let token = self.inner.reset(stored.subject_id, None);
        tracing::info!(cycle = token, "Subject changed, permission state dropped");

        self.refresh_permissions();
        Ok(())
    }

    /// Clear the stored identity and publish a ready, zero-permission state.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::GrantStore` if the store cannot be cleared; the
    /// session state is left untouched in that case.
    pub fn sign_out(&self) -> AuthzResult<()> {
        self.inner.grants.clear()?;
        let token = self.inner.reset(None, Some(true));
        tracing::info!(cycle = token, "Signed out, permission state dropped");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Lifecycle state of the most recent cycle.
    #[must_use]
    pub fn state(&self) -> SessionState {
        let started = self.inner.tokens.load(Ordering::SeqCst);
        if started == 0 {
            return SessionState::Uninitialized;
        }
        if self.inner.snapshot.load().cycle() == Some(started - 1) {
            SessionState::Ready
        } else {
            SessionState::Compiling
        }
    }

    /// Refresh token of the most recently started cycle, if any.
    #[must_use]
    pub fn current_cycle(&self) -> Option<u64> {
        self.inner.tokens.load(Ordering::SeqCst).checked_sub(1)
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            cycles_started: self.inner.cycles_started.load(Ordering::Relaxed),
            cycles_published: self.inner.cycles_published.load(Ordering::Relaxed),
            cycles_discarded: self.inner.cycles_discarded.load(Ordering::Relaxed),
            fetch_failures: self.inner.fetch_failures.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for PermissionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.inner.snapshot.load();
        f.debug_struct("PermissionSession")
            .field("ready", &snapshot.is_ready())
            .field("cycle", &snapshot.cycle())
            .field("policies", &snapshot.policies().len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthzError, MetadataCategory};
    use crate::grant_store::InMemoryGrantStore;
    use crate::metadata::StaticMetadataSource;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::oneshot;

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn grant(entries: &[(&str, &[&str])]) -> RawGrant {
        entries
            .iter()
            .map(|(resource, perms)| {
                (
                    resource.to_string(),
                    perms.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect()
    }

    fn console_metadata() -> StaticMetadataSource {
        StaticMetadataSource::new(
            vec![
                ResourceMeta::new("10", "User Management"),
                ResourceMeta::new("11", "Role Management"),
            ],
            vec![
                PermissionMeta::new("1", "read"),
                PermissionMeta::new("2", "write"),
                PermissionMeta::new("3", "delete"),
            ],
            vec![RoleMeta::new("r1", "admin")],
        )
    }

    fn session_with(store: InMemoryGrantStore, source: impl MetadataSource + 'static) -> PermissionSession {
        PermissionSession::new(Arc::new(store), Arc::new(source), SessionConfig::for_testing())
    }

    /// Metadata source whose permission fetches block until released.
    ///
    /// Each call pops the next gate; the fetch returns the permissions sent
    /// through it.
    struct GatedSource {
        resources: Vec<ResourceMeta>,
        gates: Mutex<VecDeque<oneshot::Receiver<Vec<PermissionMeta>>>>,
    }

    impl GatedSource {
        fn new(gates: Vec<oneshot::Receiver<Vec<PermissionMeta>>>) -> Self {
            Self {
                resources: vec![ResourceMeta::new("10", "User Management")],
                gates: Mutex::new(gates.into()),
            }
        }

        fn remaining(&self) -> usize {
            self.gates.lock().unwrap().len()
        }

        /// Yields until `count` gates are left, i.e. until that many fetches
        /// are parked on their gate.
        async fn wait_for_remaining(&self, count: usize) {
            while self.remaining() != count {
                tokio::task::yield_now().await;
            }
        }
    }

    #[async_trait]
    impl MetadataSource for GatedSource {
        async fn fetch_resources(&self, _: Option<&str>) -> AuthzResult<Vec<ResourceMeta>> {
            Ok(self.resources.clone())
        }

        async fn fetch_permissions(&self, _: Option<&str>) -> AuthzResult<Vec<PermissionMeta>> {
            let gate = self
                .gates
                .lock()
                .unwrap()
                .pop_front()
                .expect("no gate left for this fetch");
            gate.await.map_err(|_| {
                AuthzError::metadata(MetadataCategory::Permissions, "gate dropped")
            })
        }

        async fn fetch_roles(&self, _: Option<&str>) -> AuthzResult<Vec<RoleMeta>> {
            Ok(Vec::new())
        }
    }

    /// Metadata source where selected categories always fail.
    struct FailingSource {
        inner: StaticMetadataSource,
        fail: Vec<MetadataCategory>,
    }

    #[async_trait]
    impl MetadataSource for FailingSource {
        async fn fetch_resources(&self, c: Option<&str>) -> AuthzResult<Vec<ResourceMeta>> {
            if self.fail.contains(&MetadataCategory::Resources) {
                return Err(AuthzError::metadata(MetadataCategory::Resources, "HTTP 500"));
            }
            self.inner.fetch_resources(c).await
        }

        async fn fetch_permissions(&self, c: Option<&str>) -> AuthzResult<Vec<PermissionMeta>> {
            if self.fail.contains(&MetadataCategory::Permissions) {
                return Err(AuthzError::metadata(MetadataCategory::Permissions, "HTTP 502"));
            }
            self.inner.fetch_permissions(c).await
        }

        async fn fetch_roles(&self, c: Option<&str>) -> AuthzResult<Vec<RoleMeta>> {
            if self.fail.contains(&MetadataCategory::Roles) {
                return Err(AuthzError::metadata(MetadataCategory::Roles, "HTTP 503"));
            }
            self.inner.fetch_roles(c).await
        }
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_new_session_is_uninitialized_and_denies() {
        let session = session_with(
            InMemoryGrantStore::with_grant("u1", grant(&[("10", &["1"])])),
            console_metadata(),
        );

        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(!session.is_ready());
        assert!(!session.can("User Management", "read"));
        assert_eq!(session.current_cycle(), None);
    }

    #[tokio::test]
    async fn test_scenario_user_management() {
        let session = session_with(
            InMemoryGrantStore::with_grant("u1", grant(&[("10", &["1", "2"])])),
            console_metadata(),
        );

        let outcome = session.refresh().await;
        assert_eq!(outcome, CycleOutcome::Published { cycle: 0 });
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.is_ready());

        assert!(session.can("User Management", "read"));
        assert!(session.can("User Management", "write"));
        assert!(!session.can("User Management", "delete"));
        assert!(!session.can("Role Management", "read"));

        let mut policies = session.snapshot().policies().to_vec();
        policies.sort();
        assert_eq!(
            policies,
            vec![
                crate::PolicyTriple::new("u1", "User Management", "read"),
                crate::PolicyTriple::new("u1", "User Management", "write"),
            ]
        );
    }

    #[tokio::test]
    async fn test_can_any_and_can_all() {
        let session = session_with(
            InMemoryGrantStore::with_grant("u1", grant(&[("10", &["1", "2"])])),
            console_metadata(),
        );
        session.refresh().await;

        assert!(session.can_any("User Management", &["delete", "write"]));
        assert!(!session.can_any("User Management", &["delete"]));
        assert!(session.can_all("User Management", &["read", "write"]));
        assert!(!session.can_all("User Management", &["read", "delete"]));
        assert!(!session.can_all("User Management", &[]));
        assert_eq!(session.actions_for("User Management"), vec!["read", "write"]);
    }

    #[tokio::test]
    async fn test_malformed_input_is_denied() {
        let session = session_with(
            InMemoryGrantStore::with_grant("u1", grant(&[("10", &["1"])])),
            console_metadata(),
        );
        session.refresh().await;

        assert!(!session.can("", "read"));
        assert!(!session.can("User Management", ""));
        assert!(!session.can("", ""));
    }

    #[tokio::test]
    async fn test_zero_grant_is_ready_with_no_permissions() {
        let session = session_with(
            InMemoryGrantStore::with_grant("u1", RawGrant::new()),
            console_metadata(),
        );
        session.refresh().await;

        assert!(session.is_ready());
        assert!(!session.can("User Management", "read"));
        assert!(!session.can("anything", "anything"));
        assert!(session.snapshot().policies().is_empty());
    }

    #[tokio::test]
    async fn test_missing_identity_is_ready_with_no_permissions() {
        let session = session_with(InMemoryGrantStore::new(), console_metadata());
        session.refresh().await;

        assert!(session.is_ready());
        assert_eq!(session.snapshot().subject(), None);
        assert!(!session.can("User Management", "read"));
        // Metadata is still available for rendering.
        assert_eq!(session.resources().len(), 2);
        assert_eq!(session.roles().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_fetch_failure_still_becomes_ready() {
        let session = session_with(
            InMemoryGrantStore::with_grant("u1", grant(&[("10", &["1", "2"])])),
            FailingSource {
                inner: console_metadata(),
                fail: vec![MetadataCategory::Permissions],
            },
        );

        let outcome = session.refresh().await;
        assert!(outcome.is_published());
        assert!(session.is_ready());
        assert!(!session.can("User Management", "read"));
        assert_eq!(session.resources().len(), 2);
        assert_eq!(session.roles().len(), 1);
        assert!(session.permissions().is_empty());

        let snapshot = session.snapshot();
        assert!(snapshot.fetch_report().has_failed(MetadataCategory::Permissions));
        assert_eq!(session.stats().fetch_failures, 1);
    }

    #[tokio::test]
    async fn test_all_fetches_failing_still_becomes_ready() {
        let session = session_with(
            InMemoryGrantStore::with_grant("u1", grant(&[("10", &["1"])])),
            FailingSource {
                inner: console_metadata(),
                fail: MetadataCategory::ALL.to_vec(),
            },
        );

        session.refresh().await;
        assert!(session.is_ready());
        assert!(!session.can("User Management", "read"));
        assert_eq!(session.snapshot().fetch_report().failed.len(), 3);
    }

    #[tokio::test]
    async fn test_stale_cycle_is_discarded() {
        let (release_a, gate_a) = oneshot::channel();
        let (release_b, gate_b) = oneshot::channel();
        let source = Arc::new(GatedSource::new(vec![gate_a, gate_b]));
        let session = PermissionSession::new(
            Arc::new(InMemoryGrantStore::with_grant("u1", grant(&[("10", &["1", "2"])]))),
            source.clone(),
            SessionConfig::for_testing(),
        );

        // Cycle A (token 0) starts and blocks on its permission fetch.
        let cycle_a = tokio::spawn({
            let session = session.clone();
            async move { session.refresh().await }
        });
        source.wait_for_remaining(1).await;
        assert_eq!(session.current_cycle(), Some(0));

        // Cycle B (token 1) starts, resolves and publishes first.
        let cycle_b = tokio::spawn({
            let session = session.clone();
            async move { session.refresh().await }
        });
        source.wait_for_remaining(0).await;
        assert_eq!(session.current_cycle(), Some(1));
        release_b
            .send(vec![PermissionMeta::new("1", "read")])
            .unwrap();
        assert_eq!(cycle_b.await.unwrap(), CycleOutcome::Published { cycle: 1 });
        assert!(session.can("User Management", "read"));
        assert!(!session.can("User Management", "write"));

        // A resolves late with a different answer and must not clobber B.
        release_a
            .send(vec![
                PermissionMeta::new("1", "read"),
                PermissionMeta::new("2", "write"),
            ])
            .unwrap();
        assert_eq!(cycle_a.await.unwrap(), CycleOutcome::Discarded { cycle: 0 });

        assert!(session.is_ready());
        assert_eq!(session.snapshot().cycle(), Some(1));
        assert!(!session.can("User Management", "write"));

        let stats = session.stats();
        assert_eq!(stats.cycles_started, 2);
        assert_eq!(stats.cycles_published, 1);
        assert_eq!(stats.cycles_discarded, 1);
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_snapshot_visible() {
        let (release_first, gate_first) = oneshot::channel();
        let (release_second, gate_second) = oneshot::channel();
        let source = Arc::new(GatedSource::new(vec![gate_first, gate_second]));
        let session = PermissionSession::new(
            Arc::new(InMemoryGrantStore::with_grant("u1", grant(&[("10", &["1", "2"])]))),
            source.clone(),
            SessionConfig::for_testing(),
        );

        release_first
            .send(vec![PermissionMeta::new("1", "read")])
            .unwrap();
        session.refresh().await;
        assert!(session.can("User Management", "read"));

        let refresh = tokio::spawn({
            let session = session.clone();
            async move { session.refresh().await }
        });
        source.wait_for_remaining(0).await;

        // Mid-refresh: still ready, still the old policies.
        assert_eq!(session.state(), SessionState::Compiling);
        assert!(session.is_ready());
        assert!(session.can("User Management", "read"));
        assert!(!session.can("User Management", "write"));

        release_second
            .send(vec![
                PermissionMeta::new("1", "read"),
                PermissionMeta::new("2", "write"),
            ])
            .unwrap();
        assert!(refresh.await.unwrap().is_published());
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.can("User Management", "write"));
    }

    #[tokio::test]
    async fn test_mount_and_wait_until_ready() {
        let session = PermissionSession::mount(
            Arc::new(InMemoryGrantStore::with_grant("u1", grant(&[("11", &["3"])]))),
            Arc::new(console_metadata()),
            SessionConfig::for_testing(),
        );

        tokio::time::timeout(Duration::from_secs(5), session.wait_until_ready())
            .await
            .expect("session should become ready");
        assert!(session.can("Role Management", "delete"));
        assert_eq!(session.snapshot().cycle(), Some(0));
    }

    #[tokio::test]
    async fn test_subscribe_sees_published_cycles() {
        let session = session_with(
            InMemoryGrantStore::with_grant("u1", grant(&[("10", &["1"])])),
            console_metadata(),
        );
        let mut receiver = session.subscribe();

        session.refresh().await;
        session.refresh().await;

        assert!(receiver.has_changed().unwrap());
        assert_eq!(*receiver.borrow_and_update(), 1);
    }

    #[tokio::test]
    async fn test_switch_subject_drops_cached_state() {
        let store = Arc::new(InMemoryGrantStore::with_grant("u1", grant(&[("10", &["1"])])));
        let session = PermissionSession::new(
            store.clone(),
            Arc::new(console_metadata()),
            SessionConfig::for_testing(),
        );
        session.refresh().await;
        assert!(session.can("User Management", "read"));

        session
            .switch_subject("u2", grant(&[("11", &["2"])]))
            .unwrap();

        // Old identity's permissions are gone immediately, readiness is kept.
        assert!(session.is_ready());
        assert!(!session.can("User Management", "read"));
        assert_eq!(session.snapshot().subject(), Some("u2"));
        assert_eq!(store.subject_id().unwrap().as_deref(), Some("u2"));

        tokio::time::timeout(Duration::from_secs(5), session.wait_until_settled())
            .await
            .expect("session should settle");
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.snapshot().subject(), Some("u2"));
        assert!(session.can("Role Management", "write"));
        assert!(!session.can("User Management", "read"));

        let stats = session.stats();
        assert_eq!(stats.cycles_started, 2);
        assert_eq!(
            stats.cycles_started,
            stats.cycles_published + stats.cycles_discarded
        );
    }

    #[tokio::test]
    async fn test_switch_subject_before_first_cycle_stays_not_ready() {
        let session = session_with(InMemoryGrantStore::new(), console_metadata());

        session
            .switch_subject("u2", grant(&[("11", &["2"])]))
            .unwrap();
        assert!(!session.is_ready());

        tokio::time::timeout(Duration::from_secs(5), session.wait_until_ready())
            .await
            .expect("session should become ready");
        assert!(session.can("Role Management", "write"));
    }

    /// Store that rewrites itself to another identity between the per-field
    /// reads, the way a concurrent login would.
    struct InterleavingStore {
        inner: InMemoryGrantStore,
    }

    impl GrantStore for InterleavingStore {
        fn load(&self) -> AuthzResult<StoredGrant> {
            self.inner.load()
        }

        fn save(&self, stored: &StoredGrant) -> AuthzResult<()> {
            self.inner.save(stored)
        }

        fn subject_id(&self) -> AuthzResult<Option<SubjectId>> {
            let current = self.inner.subject_id()?;
            self.inner
                .save(&StoredGrant::new("u2", grant(&[("11", &["3"])])))?;
            Ok(current)
        }
    }

    #[tokio::test]
    async fn test_cycle_reads_subject_and_grant_together() {
        let session = PermissionSession::new(
            Arc::new(InterleavingStore {
                inner: InMemoryGrantStore::with_grant("u1", grant(&[("10", &["1"])])),
            }),
            Arc::new(console_metadata()),
            SessionConfig::for_testing(),
        );

        assert!(session.refresh().await.is_published());
        let snapshot = session.snapshot();
        assert_eq!(snapshot.subject(), Some("u1"));
        assert!(snapshot.allows("User Management", "read"));
        assert!(!snapshot.allows("Role Management", "delete"));
    }

    #[tokio::test]
    async fn test_sign_out_is_ready_with_zero_permissions() {
        let store = Arc::new(InMemoryGrantStore::with_grant("u1", grant(&[("10", &["1"])])));
        let session = PermissionSession::new(
            store.clone(),
            Arc::new(console_metadata()),
            SessionConfig::for_testing(),
        );
        session.refresh().await;

        session.sign_out().unwrap();
        assert!(session.is_ready());
        assert!(!session.can("User Management", "read"));
        assert_eq!(store.subject_id().unwrap(), None);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.stats().cycles_started, 1);
    }

    #[test]
    fn test_refresh_outside_runtime_does_not_panic() {
        let session = session_with(InMemoryGrantStore::new(), console_metadata());
        session.refresh_permissions();
        assert!(!session.is_ready());
        assert_eq!(session.current_cycle(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refresh() {
        let config = SessionConfig::for_testing().with_refresh_interval(Duration::from_secs(60));
        let session = PermissionSession::new(
            Arc::new(InMemoryGrantStore::with_grant("u1", grant(&[("10", &["1"])]))),
            Arc::new(console_metadata()),
            config,
        );

        let handle = session.spawn_periodic_refresh().expect("periodic refresh enabled");
        tokio::time::sleep(Duration::from_secs(125)).await;

        assert!(session.is_ready());
        assert_eq!(session.stats().cycles_published, 2);
        handle.abort();
    }

    #[tokio::test]
    async fn test_periodic_refresh_disabled_by_default() {
        let session = session_with(InMemoryGrantStore::new(), console_metadata());
        assert!(session.spawn_periodic_refresh().is_none());
    }
}
