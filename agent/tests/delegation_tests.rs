//! Integration tests for delegation to remote agents
//!
//! The remote agent is a wiremock server answering the RPC endpoints.
//!
//! Tests verify:
//! - Remote nodes are forwarded exactly once and never touched locally
//! - Remote messages are merged into the local log, prefixed by agent id
//! - Forwarding back along the same request is refused
//! - Remote error categories survive the round trip
//! - Checks are delegated too
//! - Servers naming no agent stay local

mod common;

use agent::errors::{ErrorCategory, UpdateError};
use agent::types::{ResourceKind, ResourceRequest};
use common::fixtures::*;
use serde_json::json;

/// prod belongs to `@ENV_AGENT@`, its server as1 to `@SERVER_AGENT@`.
const SPLIT_FLEET: &str = r#"
[[environments]]
name = "prod"
agent = "@ENV_AGENT@"

[[environments.application_servers]]
name = "as1"
agent = "@SERVER_AGENT@"
technology = "mock"

[[environments.application_servers.jdbc_connection_pools]]
name = "P1"
url = "jdbc:postgresql://db/app"
"#;

fn split_fleet(agents: &str, env_agent: &str, server_agent: &str) -> String {
    format!(
        "{}\n{}",
        agents,
        SPLIT_FLEET
            .replace("@ENV_AGENT@", env_agent)
            .replace("@SERVER_AGENT@", server_agent)
    )
}

fn local_agent_toml(id: &str) -> String {
    format!("[[agents]]\nid = \"{}\"\nhostname = \"localhost\"\n", id)
}

/// agent-a runs the test, agent-b is the mock.
async fn delegating_agent() -> (TestAgent, MockAgentServer) {
    let remote = MockAgentServer::start().await;
    let agents = format!(
        "{}\n{}",
        local_agent_toml(LOCAL_AGENT),
        remote.agent_toml(REMOTE_AGENT)
    );
    let agent = TestAgent::new(
        LOCAL_AGENT,
        &split_fleet(&agents, LOCAL_AGENT, REMOTE_AGENT),
    );
    (agent, remote)
}

#[tokio::test]
async fn remote_server_is_forwarded_once_and_merged() {
    let (agent, remote) = delegating_agent().await;
    remote
        .mock_update(
            "application-server",
            json!({
                "environment": "prod",
                "server": "as1",
                "delegation": true,
                "via": ["agent-a"],
                "depth": 1
            }),
            true,
            1,
        )
        .await;

    let outcome = agent
        .engine
        .update(ResourceKind::Environment, ResourceRequest::environment(environments::PROD))
        .await
        .unwrap();

    assert!(outcome.updated);
    assert!(agent.controller.calls().is_empty());
    assert!(outcome
        .messages
        .iter()
        .any(|m| m.text == "[agent-b] Application server as1 updated remotely"));
    assert!(outcome
        .messages
        .iter()
        .any(|m| m.text == "Environment prod updated"));
}

#[tokio::test]
async fn forwarding_back_along_the_same_request_is_refused() {
    let remote = MockAgentServer::start().await;
    remote.expect_no_calls().await;

    // This engine is agent-b; as1 is owned by agent-a, which forwarded the call.
    let agents = format!(
        "{}\n{}",
        remote.agent_toml(LOCAL_AGENT),
        local_agent_toml(REMOTE_AGENT)
    );
    let agent = TestAgent::new(
        REMOTE_AGENT,
        &split_fleet(&agents, REMOTE_AGENT, LOCAL_AGENT),
    );

    let inbound = ResourceRequest {
        delegation: true,
        via: vec![LOCAL_AGENT.to_string()],
        depth: 1,
        ..ResourceRequest::environment(environments::PROD).server(servers::AS1)
    };
    let err = agent
        .engine
        .update(ResourceKind::ApplicationServer, inbound)
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::Configuration(_)), "got {:?}", err);
    assert!(err.to_string().contains("delegation cycle"));
    assert!(agent.controller.calls().is_empty());
    assert!(agent.mailer.sent().is_empty());
}

#[tokio::test]
async fn remote_failure_keeps_its_category() {
    let (agent, remote) = delegating_agent().await;
    remote
        .mock_update_failure(
            "application-server",
            "not_found",
            "application server 'as1' not found",
        )
        .await;

    let err = agent
        .engine
        .update(
            ResourceKind::ApplicationServer,
            ResourceRequest::environment(environments::PROD).server(servers::AS1),
        )
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::NotFound);
    assert!(err.to_string().contains("agent 'agent-b'"));
}

#[tokio::test]
async fn remote_failure_under_environment_follows_blocker_policy() {
    let (agent, remote) = delegating_agent().await;
    remote
        .mock_update_failure("application-server", "controller", "deployment refused")
        .await;

    let outcome = agent
        .engine
        .update(ResourceKind::Environment, ResourceRequest::environment(environments::PROD))
        .await
        .unwrap();

    assert!(!outcome.updated);
    assert!(outcome
        .messages
        .iter()
        .any(|m| m.text.starts_with("Application server as1 update failed")
            && m.text.contains("deployment refused")));
}

#[tokio::test]
async fn checks_are_delegated() {
    let (agent, remote) = delegating_agent().await;
    remote.mock_check("application-server", true).await;

    let up_to_date = agent
        .engine
        .check(
            ResourceKind::ApplicationServer,
            ResourceRequest::environment(environments::PROD).server(servers::AS1),
        )
        .await
        .unwrap();

    assert!(up_to_date);
    assert!(agent.controller.calls().is_empty());
}

#[tokio::test]
async fn children_inherit_the_remote_owner() {
    let (agent, remote) = delegating_agent().await;
    remote
        .mock_update(
            "jdbc-connection-pool",
            json!({"environment": "prod", "server": "as1", "name": "P1", "depth": 1}),
            false,
            1,
        )
        .await;

    let outcome = agent
        .engine
        .update(
            ResourceKind::JdbcConnectionPool,
            ResourceRequest::environment(environments::PROD)
                .server(servers::AS1)
                .name("P1"),
        )
        .await
        .unwrap();

    assert!(!outcome.updated);
    assert!(agent.controller.calls().is_empty());
}

#[tokio::test]
async fn server_without_agent_is_local_whoever_owns_the_environment() {
    let remote = MockAgentServer::start().await;
    remote.expect_no_calls().await;
    let agents = format!(
        "{}\n{}",
        local_agent_toml(LOCAL_AGENT),
        remote.agent_toml(REMOTE_AGENT)
    );
    let fleet = split_fleet(&agents, REMOTE_AGENT, "").replace("agent = \"\"\n", "");
    let agent = TestAgent::new(LOCAL_AGENT, &fleet);

    let outcome = agent
        .engine
        .update(
            ResourceKind::ApplicationServer,
            ResourceRequest::environment(environments::PROD).server(servers::AS1),
        )
        .await
        .unwrap();

    assert!(outcome.updated);
    assert_eq!(agent.controller.mutations(), vec!["deploy:P1"]);
}
