//! Delegation of node operations to the agent owning them
//!
//! A node whose `agent` is set to another agent id is never touched locally:
//! the identical operation is forwarded once to the owning agent, flagged as
//! a delegated call, and its outcome is merged into the local update log.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info};

use crate::constants::delegation::MAX_DELEGATION_DEPTH;
use crate::constants::http::CONNECT_TIMEOUT;
use crate::errors::{ErrorCategory, UpdateError, UpdateResult};
use crate::model::{AgentEntry, Fleet};
use crate::types::{ApiResponse, ResourceKind, ResourceRequest, UpdateOutcome};
use crate::update_log::UpdateLog;

/// Transport to remote agents.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn update(
        &self,
        agent: &AgentEntry,
        kind: ResourceKind,
        request: &ResourceRequest,
    ) -> UpdateResult<UpdateOutcome>;

    async fn check(
        &self,
        agent: &AgentEntry,
        kind: ResourceKind,
        request: &ResourceRequest,
    ) -> UpdateResult<bool>;
}

/// JSON over HTTP with Bearer authentication. No request timeout: a
/// delegated environment update may legitimately run for a long time.
pub struct HttpAgentClient {
    client: Client,
    default_api_key: String,
}

impl HttpAgentClient {
    pub fn new(default_api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            default_api_key: default_api_key.into(),
        }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        agent: &AgentEntry,
        path: &str,
        request: &ResourceRequest,
    ) -> UpdateResult<T> {
        let url = format!("{}{}", agent.base_url(), path);
        let api_key = agent.api_key.as_deref().unwrap_or(&self.default_api_key);

        debug!("Forwarding {} to agent {}", path, agent.id);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| UpdateError::transport(&agent.id, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UpdateError::transport(&agent.id, e))?;

        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            UpdateError::transport(&agent.id, format!("status {}: {} ({})", status, body, e))
        })?;

        if !parsed.success {
            return Err(UpdateError::Remote {
                category: parsed.error_kind.unwrap_or(ErrorCategory::Controller),
                message: format!(
                    "agent '{}': {}",
                    agent.id,
                    parsed.error.unwrap_or_else(|| "unknown error".to_string())
                ),
            });
        }

        parsed
            .data
            .ok_or_else(|| UpdateError::transport(&agent.id, "response without data"))
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn update(
        &self,
        agent: &AgentEntry,
        kind: ResourceKind,
        request: &ResourceRequest,
    ) -> UpdateResult<UpdateOutcome> {
        self.post(agent, &format!("/update/{}", kind), request).await
    }

    async fn check(
        &self,
        agent: &AgentEntry,
        kind: ResourceKind,
        request: &ResourceRequest,
    ) -> UpdateResult<bool> {
        self.post(agent, &format!("/check/{}", kind), request).await
    }
}

/// The request the current run is serving, when it was itself delegated.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub kind: ResourceKind,
    pub request: ResourceRequest,
}

pub struct DelegationRouter {
    local_id: String,
    client: Arc<dyn AgentClient>,
}

impl DelegationRouter {
    pub fn new(local_id: impl Into<String>, client: Arc<dyn AgentClient>) -> Self {
        Self {
            local_id: local_id.into(),
            client,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// True when the node belongs to another agent.
    pub fn is_remote(&self, agent: &str) -> bool {
        !agent.is_empty() && agent != self.local_id
    }

    /// Builds the forwarded form of `request`, refusing cycles and runaway
    /// nesting.
    fn forwarded(
        &self,
        target: &AgentEntry,
        kind: ResourceKind,
        request: ResourceRequest,
        inbound: Option<&Inbound>,
    ) -> UpdateResult<ResourceRequest> {
        let depth = inbound.map(|i| i.request.depth).unwrap_or(0) + 1;
        if depth > MAX_DELEGATION_DEPTH {
            return Err(UpdateError::Configuration(format!(
                "delegation depth {} exceeds {} forwarding {} to agent '{}'",
                depth, MAX_DELEGATION_DEPTH, kind, target.id
            )));
        }

        let mut via = match inbound {
            Some(i) if i.kind == kind && i.request.same_target(&request) => i.request.via.clone(),
            _ => Vec::new(),
        };
        via.push(self.local_id.clone());

        if target.id == self.local_id || via.contains(&target.id) {
            return Err(UpdateError::Configuration(format!(
                "delegation cycle forwarding {} to agent '{}' (via {})",
                kind,
                target.id,
                via.join(" -> ")
            )));
        }

        Ok(ResourceRequest {
            delegation: true,
            via,
            depth,
            ..request
        })
    }

    /// Forwards an update to the owning agent and merges the remote outcome
    /// into `log`.
    pub async fn update(
        &self,
        fleet: &Fleet,
        agent_id: &str,
        kind: ResourceKind,
        request: ResourceRequest,
        inbound: Option<&Inbound>,
        log: &UpdateLog,
    ) -> UpdateResult<()> {
        let target = fleet.agent(agent_id).map_err(|_| {
            UpdateError::Configuration(format!("unknown agent '{}' owning {}", agent_id, kind))
        })?;
        let request = self.forwarded(target, kind, request, inbound)?;

        info!("Delegating {} update to agent {}", kind.label(), target.id);
        let outcome = self.client.update(target, kind, &request).await?;
        log.merge_remote(&target.id, outcome.updated, outcome.messages);
        Ok(())
    }

    pub async fn check(
        &self,
        fleet: &Fleet,
        agent_id: &str,
        kind: ResourceKind,
        request: ResourceRequest,
        inbound: Option<&Inbound>,
    ) -> UpdateResult<bool> {
        let target = fleet.agent(agent_id).map_err(|_| {
            UpdateError::Configuration(format!("unknown agent '{}' owning {}", agent_id, kind))
        })?;
        let request = self.forwarded(target, kind, request, inbound)?;

        debug!("Delegating {} check to agent {}", kind.label(), target.id);
        self.client.check(target, kind, &request).await
    }
}
