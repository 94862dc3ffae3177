// File: agent/src/model/store.rs
//! Loading of the declarative fleet model.
//!
//! The engine asks the store for a fresh copy at the start of every run, so
//! no in-memory model outlives a single call.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::RwLock;
use tokio::fs;
use tracing::debug;

use super::Fleet;
use crate::constants::http::MODEL_FETCH_TIMEOUT;
use crate::errors::{UpdateError, UpdateResult};

#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn load(&self) -> UpdateResult<Fleet>;
}

/// Reads the fleet model (TOML) from a local path or an http(s) URL.
pub struct FleetStore {
    location: String,
    client: Client,
}

impl FleetStore {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            client: Client::new(),
        }
    }

    async fn read(&self) -> UpdateResult<String> {
        if self.location.starts_with("http://") || self.location.starts_with("https://") {
            let response = self
                .client
                .get(&self.location)
                .timeout(MODEL_FETCH_TIMEOUT)
                .send()
                .await
                .map_err(|e| {
                    UpdateError::Configuration(format!("cannot fetch model {}: {}", self.location, e))
                })?;
            if !response.status().is_success() {
                return Err(UpdateError::Configuration(format!(
                    "cannot fetch model {}: status {}",
                    self.location,
                    response.status()
                )));
            }
            return response.text().await.map_err(|e| {
                UpdateError::Configuration(format!("cannot read model {}: {}", self.location, e))
            });
        }

        let path = self.location.strip_prefix("file:").unwrap_or(&self.location);
        fs::read_to_string(path).await.map_err(|e| {
            UpdateError::Configuration(format!("cannot read model {}: {}", self.location, e))
        })
    }
}

#[async_trait]
impl ModelStore for FleetStore {
    async fn load(&self) -> UpdateResult<Fleet> {
        let content = self.read().await?;
        let fleet: Fleet = toml::from_str(&content).map_err(|e| {
            UpdateError::Configuration(format!("cannot parse model {}: {}", self.location, e))
        })?;
        fleet.validate()?;
        debug!(
            "Loaded fleet model from {}: {} agents, {} environments",
            self.location,
            fleet.agents.len(),
            fleet.environments.len()
        );
        Ok(fleet)
    }
}

/// Model held in memory; embedders replace it wholesale between runs.
#[derive(Default)]
pub struct InMemoryModelStore {
    fleet: RwLock<Fleet>,
}

impl InMemoryModelStore {
    pub fn new(fleet: Fleet) -> Self {
        Self {
            fleet: RwLock::new(fleet),
        }
    }

    pub fn replace(&self, fleet: Fleet) {
        let mut guard = self.fleet.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = fleet;
    }
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn load(&self) -> UpdateResult<Fleet> {
        let fleet = self
            .fleet
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        fleet.validate()?;
        Ok(fleet)
    }
}
