use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rolegate_authz::{
    FileGrantStore, MetadataSource, PermissionSession, PolicySnapshot, SessionConfig,
    StaticMetadataSource,
};
use rolegate_client::RestMetadataSource;

use crate::cli::OutputFormat;
use crate::config::CliConfig;
use crate::output::{print_decision, print_fetch_report, print_policies};

/// Exit code for a denied `can` check.
pub const EXIT_DENIED: u8 = 2;

/// Metadata from `--metadata <file>` when given, otherwise from the backend.
pub fn metadata_source(
    config: &CliConfig,
    cli_server: &Option<String>,
    metadata_file: Option<&Path>,
) -> Result<Arc<dyn MetadataSource>> {
    if let Some(path) = metadata_file {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read metadata file {}", path.display()))?;
        return Ok(Arc::new(StaticMetadataSource::from_json(&content)?));
    }

    let client = config.client_for(cli_server)?;
    tracing::debug!(server = %client.base_url, "Using console backend");
    Ok(Arc::new(RestMetadataSource::new(client)?))
}

/// Mounts a session and waits for its first snapshot.
pub async fn load_snapshot(
    config: &CliConfig,
    store: FileGrantStore,
    source: Arc<dyn MetadataSource>,
) -> Result<Arc<PolicySnapshot>> {
    let session = PermissionSession::mount(Arc::new(store), source, config.session.clone());

    tokio::time::timeout(ready_deadline(&config.session), session.wait_until_ready())
        .await
        .context("Timed out waiting for permissions")?;

    let snapshot = session.snapshot();
    print_fetch_report(snapshot.fetch_report());
    Ok(snapshot)
}

/// How long to wait for the first snapshot.
///
/// Each fetch is bounded by `fetch_timeout`; the rest is slack for compile
/// and publish.
fn ready_deadline(session: &SessionConfig) -> Duration {
    session.fetch_timeout.saturating_mul(2)
}

pub fn can(snapshot: &PolicySnapshot, resource: &str, action: &str, format: OutputFormat) -> u8 {
    if snapshot.subject().is_none() {
        tracing::warn!("No stored subject; run `rolegate login` first");
    }
    let allowed = snapshot.allows(resource, action);
    print_decision(resource, action, allowed, format);
    if allowed { 0 } else { EXIT_DENIED }
}

pub fn policies(snapshot: &PolicySnapshot, format: OutputFormat) -> Result<()> {
    let mut policies = snapshot.policies().to_vec();
    policies.sort();
    print_policies(&policies, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolegate_authz::{GrantStore, RawGrant};

    const METADATA: &str = r#"{
        "resources": [{"id": "10", "name": "User Management"}],
        "permissions": [{"id": "1", "name": "read"}, {"id": "2", "name": "write"}]
    }"#;

    #[tokio::test]
    async fn test_offline_check() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_path = dir.path().join("metadata.json");
        fs::write(&metadata_path, METADATA).unwrap();

        let store = FileGrantStore::new(dir.path().join("grant.json"));
        store.set_subject_id(Some("u1".to_string())).unwrap();
        let mut grant = RawGrant::new();
        grant.insert("10".to_string(), vec!["1".to_string()]);
        store.set_raw_grant(Some(grant)).unwrap();

        let config = CliConfig::default();
        let source = metadata_source(&config, &None, Some(&metadata_path)).unwrap();
        let snapshot = load_snapshot(&config, store, source).await.unwrap();

        assert_eq!(can(&snapshot, "User Management", "read", OutputFormat::Json), 0);
        assert_eq!(
            can(&snapshot, "User Management", "write", OutputFormat::Json),
            EXIT_DENIED
        );
    }

    #[test]
    fn test_ready_deadline_saturates() {
        let session = SessionConfig::default().with_fetch_timeout(Duration::from_secs(3));
        assert_eq!(ready_deadline(&session), Duration::from_secs(6));

        let session = SessionConfig::default().with_fetch_timeout(Duration::MAX);
        assert_eq!(ready_deadline(&session), Duration::MAX);
    }

    #[test]
    fn test_missing_server_without_metadata_file() {
        let err = metadata_source(&CliConfig::default(), &None, None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("No server URL"));
    }
}
