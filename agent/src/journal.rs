// File: agent/src/journal.rs
//! Per-environment journal: an append-only audit trail of human readable
//! events, one JSON document per line in `<journal_dir>/<environment>.jsonl`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::errors::{UpdateError, UpdateResult};
use crate::update_log::Severity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEvent {
    pub date: DateTime<Utc>,
    pub severity: Severity,
    pub author: String,
    pub content: String,
}

impl JournalEvent {
    pub fn new(severity: Severity, author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            date: Utc::now(),
            severity,
            author: author.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, environment: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", environment))
    }

    pub async fn append(&self, environment: &str, event: &JournalEvent) -> UpdateResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| UpdateError::cache_io(&self.dir, e))?;

        let path = self.path(environment);
        let mut line =
            serde_json::to_string(event).map_err(|e| UpdateError::cache_io(&path, e))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| UpdateError::cache_io(&path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| UpdateError::cache_io(&path, e))?;
        file.flush().await.map_err(|e| UpdateError::cache_io(&path, e))
    }

    /// Events of an environment, oldest first. Missing journal means no events.
    pub async fn load(&self, environment: &str) -> UpdateResult<Vec<JournalEvent>> {
        let path = self.path(environment);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(UpdateError::cache_io(&path, e)),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(|e| UpdateError::cache_io(&path, e)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn appends_and_loads_in_order() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::new(dir.path().join("journal"));

        journal
            .append("prod", &JournalEvent::new(Severity::Info, "agent-a", "update started"))
            .await
            .unwrap();
        journal
            .append("prod", &JournalEvent::new(Severity::Error, "agent-a", "update failed"))
            .await
            .unwrap();

        let events = journal.load("prod").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].content, "update started");
        assert_eq!(events[1].severity, Severity::Error);

        assert!(journal.load("staging").await.unwrap().is_empty());
    }
}
