//! Reusable test utilities:
//! - Mock controller recording every runtime operation
//! - Mock mailer capturing notices and reports
//! - Mock remote agent (wiremock)
//! - Test agent harness over a temporary directory
//! - Common test data

// Each test binary uses a different subset of the fixtures
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mock_agent;
pub mod mock_controller;
pub mod mock_mailer;
pub mod test_agent;
pub mod test_data;

pub use mock_agent::MockAgentServer;
pub use mock_controller::MockController;
pub use mock_mailer::MockMailer;
pub use test_agent::TestAgent;
pub use test_data::*;
