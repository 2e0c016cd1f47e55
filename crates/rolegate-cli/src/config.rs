use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rolegate_authz::SessionConfig;
use rolegate_client::ClientConfig;
use serde::{Deserialize, Serialize};

/// Contents of `~/.rolegate/config.toml`.
///
/// ```toml
/// server = "https://console.example.com"
/// log_level = "warn"
///
/// [session]
/// fetch_timeout = "5s"
///
/// [client]
/// resources_path = "/api/v2/resources"
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub server: Option<String>,
    pub log_level: Option<String>,
    /// Read separately through `SessionConfig::from_toml_str`.
    #[serde(skip)]
    pub session: SessionConfig,
    pub client: ClientConfig,
}

fn config_dir() -> Result<PathBuf> {
    let dir = dirs::home_dir()
        .context("Cannot determine home directory")?
        .join(".rolegate");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Location of the file-backed grant store.
pub fn grant_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("grant.json"))
}

pub fn load() -> Result<CliConfig> {
    load_from(&config_dir()?.join("config.toml"))
}

pub fn load_from(path: &Path) -> Result<CliConfig> {
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let content = fs::read_to_string(path)?;
    let mut cfg: CliConfig = toml::from_str(&content)
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    cfg.session = SessionConfig::from_toml_str(&content)
        .with_context(|| format!("Invalid [session] in {}", path.display()))?;
    Ok(cfg)
}

impl CliConfig {
    /// Client configuration pointed at the resolved server.
    pub fn client_for(&self, cli_server: &Option<String>) -> Result<ClientConfig> {
        // 1. --server flag / ROLEGATE_URL env
        // 2. config.toml
        let server = cli_server.as_ref().or(self.server.as_ref()).context(
            "No server URL configured. Use --server, set ROLEGATE_URL, or pass --metadata <file>",
        )?;

        let client = ClientConfig {
            base_url: server.clone(),
            ..self.client.clone()
        };
        client.validate()?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_from(&dir.path().join("config.toml")).unwrap();
        assert!(cfg.server.is_none());
        assert_eq!(cfg.session, SessionConfig::default());
    }

    #[test]
    fn test_load_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
server = "https://console.example.com"

[session]
fetch_timeout = "5s"

[client]
roles_path = "/api/v2/roles"
"#,
        )
        .unwrap();

        let cfg = load_from(&path).unwrap();
        assert_eq!(cfg.session.fetch_timeout, Duration::from_secs(5));
        assert_eq!(cfg.session.refresh_interval, Duration::ZERO);

        let client = cfg.client_for(&None).unwrap();
        assert_eq!(client.base_url, "https://console.example.com");
        assert_eq!(client.roles_path, "/api/v2/roles");
        assert_eq!(client.resources_path, "/api/resources");
    }

    #[test]
    fn test_flag_overrides_config_server() {
        let cfg = CliConfig {
            server: Some("https://a.example.com".to_string()),
            ..CliConfig::default()
        };
        let client = cfg
            .client_for(&Some("https://b.example.com".to_string()))
            .unwrap();
        assert_eq!(client.base_url, "https://b.example.com");
    }

    #[test]
    fn test_no_server_is_an_error() {
        let err = CliConfig::default().client_for(&None).unwrap_err();
        assert!(err.to_string().contains("No server URL"));
    }

    #[test]
    fn test_invalid_session_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[session]\nfetch_timeout = \"0s\"\n").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn test_session_section_durations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "log_level = \"debug\"\n\n[session]\nfetch_timeout = \"1500ms\"\nrefresh_interval = \"2m\"\n",
        )
        .unwrap();

        let cfg = load_from(&path).unwrap();
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        assert_eq!(cfg.session.fetch_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.session.refresh_interval, Duration::from_secs(120));
    }
}
