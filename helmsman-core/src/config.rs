use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Manager process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default = "default_manager_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Staleness bound before a silent node is deemed offline.
    #[serde(default = "default_liveness_secs")]
    pub liveness_secs: i64,
    /// Concurrent agent calls during a business deploy/stop.
    #[serde(default = "default_fanout")]
    pub fanout: usize,
}

/// Agent process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_manager_url")]
    pub manager_url: String,
    /// Reported hostname; probed from the host when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Interface whose address is reported; first non-loopback,
    /// non-docker interface when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_interface: Option<String>,
    /// Seconds between telemetry pushes.
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_agent_listen_port")]
    pub port: u16,
    /// Scratch directory for downloaded binaries and config files.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    /// Identity file holding the manager-assigned node id.
    #[serde(default = "default_identity_file")]
    pub identity_file: String,
}

fn default_manager_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "helmsman.db".to_string()
}

fn default_liveness_secs() -> i64 {
    5
}

fn default_fanout() -> usize {
    8
}

fn default_manager_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_interval() -> u64 {
    5
}

fn default_agent_listen_port() -> u16 {
    8081
}

fn default_work_dir() -> String {
    "/tmp/helmsman/components".to_string()
}

fn default_identity_file() -> String {
    "agent_id.txt".to_string()
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            port: default_manager_port(),
            db_path: default_db_path(),
            liveness_secs: default_liveness_secs(),
            fanout: default_fanout(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            manager_url: default_manager_url(),
            hostname: None,
            network_interface: None,
            interval: default_interval(),
            port: default_agent_listen_port(),
            work_dir: default_work_dir(),
            identity_file: default_identity_file(),
        }
    }
}

impl ManagerConfig {
    /// Load from a JSON config file; defaults when the path is absent.
    pub async fn load(config_path: Option<&str>) -> Result<Self> {
        load_json(config_path).await
    }
}

impl AgentConfig {
    pub async fn load(config_path: Option<&str>) -> Result<Self> {
        load_json(config_path).await
    }
}

async fn load_json<T>(config_path: Option<&str>) -> Result<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    match config_path {
        Some(path) if Path::new(path).exists() => {
            let content = tokio::fs::read_to_string(path).await?;
            let config = serde_json::from_str(&content)?;
            Ok(config)
        }
        Some(path) => Err(anyhow::anyhow!("Config file not found: {}", path)),
        None => Ok(T::default()),
    }
}

pub async fn save_json<T: Serialize>(config: &T, path: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_ports() {
        let manager = ManagerConfig::default();
        assert_eq!(manager.port, 8080);
        assert_eq!(manager.liveness_secs, 5);

        let agent = AgentConfig::default();
        assert_eq!(agent.port, 8081);
        assert_eq!(agent.interval, 5);
    }

    #[tokio::test]
    async fn load_reads_partial_json_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        tokio::fs::write(&path, r#"{"manager_url": "http://10.0.0.1:8080", "interval": 2}"#)
            .await
            .unwrap();

        let config = AgentConfig::load(Some(path.to_str().unwrap())).await.unwrap();
        assert_eq!(config.manager_url, "http://10.0.0.1:8080");
        assert_eq!(config.interval, 2);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.port, 8081);
    }

    #[tokio::test]
    async fn load_missing_file_is_an_error() {
        let result = ManagerConfig::load(Some("/nonexistent/helmsman.json")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manager.json");
        let mut config = ManagerConfig::default();
        config.port = 9090;
        config.db_path = "/var/lib/helmsman/state.db".to_string();

        save_json(&config, path.to_str().unwrap()).await.unwrap();
        let loaded = ManagerConfig::load(Some(path.to_str().unwrap())).await.unwrap();
        assert_eq!(loaded.port, 9090);
        assert_eq!(loaded.db_path, "/var/lib/helmsman/state.db");
    }
}
