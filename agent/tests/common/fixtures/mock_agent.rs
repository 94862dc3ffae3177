//! Mock remote agent for delegation tests
//!
//! Answers the agent RPC endpoints with canned envelopes, so the delegating
//! side can be tested without a second engine.

use serde_json::{json, Value};
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub struct MockAgentServer {
    pub server: MockServer,
}

impl MockAgentServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn hostname(&self) -> String {
        self.server.address().ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.server.address().port()
    }

    /// `[[agents]]` table pointing at this server.
    pub fn agent_toml(&self, id: &str) -> String {
        format!(
            "[[agents]]\nid = \"{}\"\nhostname = \"{}\"\nport = {}\napi_key = \"{}\"\n",
            id,
            self.hostname(),
            self.port(),
            super::test_data::REMOTE_API_KEY
        )
    }

    /// Successful update of `kind`, expected exactly `times` times with a
    /// body containing `expected_body`.
    pub async fn mock_update(&self, kind: &str, expected_body: Value, updated: bool, times: u64) {
        Mock::given(method("POST"))
            .and(path(format!("/update/{}", kind)))
            .and(header(
                "authorization",
                format!("Bearer {}", super::test_data::REMOTE_API_KEY).as_str(),
            ))
            .and(body_partial_json(expected_body))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "updated": updated,
                    "messages": [
                        {"severity": "info", "text": "Application server as1 updated remotely"}
                    ]
                }
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_update_failure(&self, kind: &str, error_kind: &str, message: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/update/{}", kind)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": message,
                "error_kind": error_kind
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_check(&self, kind: &str, up_to_date: bool) {
        Mock::given(method("POST"))
            .and(path(format!("/check/{}", kind)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": up_to_date
            })))
            .mount(&self.server)
            .await;
    }

    /// Fails the test (on drop) if anything reaches this agent.
    pub async fn expect_no_calls(&self) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&self.server)
            .await;
    }
}
