//! Per-run update log
//!
//! One [`UpdateLog`] is created for each top-level or delegated call. It
//! collects ordered messages and the aggregate `updated` flag which drives
//! the restart and cache cleaning decisions of application servers. At the
//! end of a run the log is frozen into an [`UpdateReport`], persisted and
//! rendered by the publisher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::{UpdateError, UpdateResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Summary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub severity: Severity,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReport {
    pub run_id: String,
    pub title: String,
    pub environment: String,
    pub status: String,
    pub updated: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub messages: Vec<UpdateMessage>,
}

impl UpdateReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.messages.iter().filter(|m| m.severity == severity).count()
    }

    /// Writes the report as JSON under `<log_dir>/<environment>/<run_id>.json`.
    pub async fn persist(&self, log_dir: &Path) -> UpdateResult<PathBuf> {
        let dir = log_dir.join(&self.environment);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| UpdateError::cache_io(&dir, e))?;

        let path = dir.join(format!("{}.json", self.run_id));
        let body = serde_json::to_vec_pretty(self)
            .map_err(|e| UpdateError::cache_io(&path, e))?;
        fs::write(&path, body)
            .await
            .map_err(|e| UpdateError::cache_io(&path, e))?;
        Ok(path)
    }
}

pub struct UpdateLog {
    state: Mutex<UpdateReport>,
}

impl UpdateLog {
    pub fn new(title: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(UpdateReport {
                run_id: Uuid::new_v4().to_string(),
                title: title.into(),
                environment: environment.into(),
                status: "in progress".to_string(),
                updated: false,
                started_at: Utc::now(),
                finished_at: None,
                messages: Vec::new(),
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut UpdateReport) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    fn push(&self, severity: Severity, text: String) {
        self.with_state(|state| state.messages.push(UpdateMessage { severity, text }));
    }

    pub fn info(&self, text: impl Into<String>) {
        let text = text.into();
        info!("{}", text);
        self.push(Severity::Info, text);
    }

    pub fn warn(&self, text: impl Into<String>) {
        let text = text.into();
        warn!("{}", text);
        self.push(Severity::Warn, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        let text = text.into();
        error!("{}", text);
        self.push(Severity::Error, text);
    }

    pub fn summary(&self, text: impl Into<String>) {
        let text = text.into();
        info!("{}", text);
        self.push(Severity::Summary, text);
    }

    pub fn mark_updated(&self) {
        self.with_state(|state| state.updated = true);
    }

    pub fn is_updated(&self) -> bool {
        self.with_state(|state| state.updated)
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        self.with_state(|state| state.status = status);
    }

    /// Folds the outcome of a delegated call into this log.
    pub fn merge_remote(&self, agent: &str, updated: bool, messages: Vec<UpdateMessage>) {
        self.with_state(|state| {
            state.updated |= updated;
            state.messages.extend(messages.into_iter().map(|m| UpdateMessage {
                severity: m.severity,
                text: format!("[{}] {}", agent, m.text),
            }));
        });
    }

    pub fn finish(&self) -> UpdateReport {
        self.with_state(|state| {
            state.finished_at = Some(Utc::now());
            state.clone()
        })
    }

    pub fn report(&self) -> UpdateReport {
        self.with_state(|state| state.clone())
    }
}
