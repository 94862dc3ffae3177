// File: agent/src/config/manager.rs
use super::AgentConfig;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use crate::constants::defaults;

pub struct ConfigManager {
    current_config: Arc<AgentConfig>,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<AgentConfig> {
        self.current_config.clone()
    }

    async fn load_configuration(config_dir: &str) -> Result<AgentConfig> {
        let config_path = format!("{}/agent.toml", config_dir);
        let content = fs::read_to_string(&config_path)
            .await
            .map_err(|e| anyhow!("Failed to read agent config {}: {}", config_path, e))?;

        let mut config = Self::parse(&content)?;

        // Environment wins over the file so keys stay out of version control
        if let Ok(api_key) = std::env::var("AGENT_API_KEY") {
            config.api_key = api_key;
        }
        if config.api_key.is_empty() {
            config.api_key = defaults::DEVELOPMENT_API_KEY.to_string();
        }
        if config.api_key == defaults::DEVELOPMENT_API_KEY {
            warn!("Using default development API key - set AGENT_API_KEY environment variable for production");
        }

        info!(
            "Loaded agent config: id={}, bind={}, model={}",
            config.agent_id,
            config.bind_address(),
            config.model_location
        );

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<AgentConfig> {
        let config: AgentConfig =
            toml::from_str(content).map_err(|e| anyhow!("Failed to parse agent config: {}", e))?;

        if config.agent_id.trim().is_empty() {
            return Err(anyhow!("Missing required field: agent_id"));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = ConfigManager::parse(r#"agent_id = "agent-a""#).unwrap();

        assert_eq!(config.agent_id, "agent-a");
        assert_eq!(config.bind_address(), "0.0.0.0:8745");
        assert_eq!(config.cache_dir, PathBuf::from(defaults::CACHE_DIR));
        assert!(config.mail.is_none());
        assert!(config.report_template.is_none());
    }

    #[test]
    fn parses_mail_relay_section() {
        let config = ConfigManager::parse(
            r#"
agent_id = "agent-a"
port = 9000
report_template = "templates/report.txt"

[mail]
relay_url = "http://relay.local/send"
"#,
        )
        .unwrap();

        let mail = config.mail.unwrap();
        assert_eq!(mail.relay_url, "http://relay.local/send");
        assert_eq!(mail.from, defaults::MAIL_FROM);
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.report_template,
            Some(PathBuf::from("templates/report.txt"))
        );
    }

    #[test]
    fn blank_agent_id_is_rejected() {
        let err = ConfigManager::parse(r#"agent_id = "  ""#).unwrap_err();
        assert!(err.to_string().contains("agent_id"));
    }

    #[tokio::test]
    async fn loads_agent_toml_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("agent.toml"),
            "agent_id = \"agent-b\"\napi_key = \"secret\"\n",
        )
        .await
        .unwrap();

        let manager = ConfigManager::new(dir.path().display().to_string())
            .await
            .unwrap();
        let config = manager.get_current_config();
        assert_eq!(config.agent_id, "agent-b");
        assert!(!config.api_key.is_empty());
    }

    #[tokio::test]
    async fn missing_config_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigManager::new(dir.path().display().to_string()).await;
        assert!(result.is_err());
    }
}
