// File: agent/src/config/mod.rs
pub mod manager;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use manager::ConfigManager;

use crate::constants::defaults;

/// Process configuration of one agent, read from `config/agent.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Identifier matched against the `agent` field of model elements
    pub agent_id: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer key accepted by this agent and presented to other agents
    #[serde(default)]
    pub api_key: String,
    /// Path or http(s) URL of the fleet model
    #[serde(default = "default_model_location")]
    pub model_location: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_journal_dir")]
    pub journal_dir: PathBuf,
    /// Template used to render update reports; plain text when absent
    pub report_template: Option<PathBuf>,
    pub mail: Option<MailConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// HTTP endpoint of the mail relay; messages are posted as JSON
    pub relay_url: String,
    #[serde(default = "default_mail_from")]
    pub from: String,
}

fn default_host() -> String {
    defaults::BIND_HOST.to_string()
}

fn default_port() -> u16 {
    defaults::PORT
}

fn default_model_location() -> String {
    defaults::MODEL_LOCATION.to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(defaults::CACHE_DIR)
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(defaults::LOG_DIR)
}

fn default_journal_dir() -> PathBuf {
    PathBuf::from(defaults::JOURNAL_DIR)
}

fn default_mail_from() -> String {
    defaults::MAIL_FROM.to_string()
}

impl AgentConfig {
    /// Minimal configuration rooted in `base_dir`, used by embedders and tests.
    pub fn new(agent_id: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            agent_id: agent_id.into(),
            host: default_host(),
            port: default_port(),
            api_key: defaults::DEVELOPMENT_API_KEY.to_string(),
            model_location: base_dir.join("fleet.toml").display().to_string(),
            cache_dir: base_dir.join("cache"),
            log_dir: base_dir.join("logs"),
            journal_dir: base_dir.join("journal"),
            report_template: None,
            mail: None,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
