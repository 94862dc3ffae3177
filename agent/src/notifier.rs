//! Countdown notice sent before a client-initiated environment update.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::mailer::{Mail, Mailer};
use crate::model::Environment;
use crate::update_log::UpdateLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    Elapsed,
    Cancelled,
}

/// A wait until a fixed deadline that can be interrupted through its token.
pub struct Countdown {
    deadline: Instant,
    token: CancellationToken,
}

impl Countdown {
    pub fn new(duration: Duration, token: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + duration,
            token,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub async fn wait(&self) -> CountdownOutcome {
        tokio::select! {
            _ = sleep_until(self.deadline) => CountdownOutcome::Elapsed,
            _ = self.token.cancelled() => CountdownOutcome::Cancelled,
        }
    }
}

pub fn notice_subject(environment: &str, minutes: u64) -> String {
    format!("[jeefleet] {} will be updated in {} minute(s)", environment, minutes)
}

pub fn notice_body(environment: &str, minutes: u64) -> String {
    format!(
        "The environment {} is going to be updated in {} minute(s).\n\
         Applications of this environment may be unavailable during the update.\n",
        environment, minutes
    )
}

pub struct NotificationGate {
    mailer: Arc<dyn Mailer>,
    shutdown: CancellationToken,
}

impl NotificationGate {
    pub fn new(mailer: Arc<dyn Mailer>, shutdown: CancellationToken) -> Self {
        Self { mailer, shutdown }
    }

    /// Mails the notice to every recipient, then waits for the countdown.
    /// Neither a delivery failure nor an interruption stops the update.
    pub async fn run(&self, environment: &Environment, log: &UpdateLog) {
        let minutes = environment.notifiers.countdown_minutes;
        let recipients: Vec<String> = environment
            .notifiers
            .recipients
            .iter()
            .map(|r| environment.substitute(r))
            .collect();

        if !recipients.is_empty() {
            let mail = Mail {
                from: self.mailer.sender().to_string(),
                to: recipients,
                subject: notice_subject(&environment.name, minutes),
                body: notice_body(&environment.name, minutes),
            };
            match self.mailer.send(&mail).await {
                Ok(()) => log.info(format!(
                    "Update notice sent for environment {}",
                    environment.name
                )),
                Err(e) => warn!(
                    "Cannot send update notice for environment {}: {}",
                    environment.name, e
                ),
            }
        }

        if minutes == 0 {
            return;
        }

        log.info(format!("Waiting {} minute(s) before updating", minutes));
        let countdown = Countdown::new(
            Duration::from_secs(minutes * 60),
            self.shutdown.child_token(),
        );
        if countdown.wait().await == CountdownOutcome::Cancelled {
            warn!(
                "Countdown of environment {} interrupted, update proceeds",
                environment.name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::DisabledMailer;

    #[tokio::test(start_paused = true)]
    async fn countdown_waits_until_deadline() {
        let start = Instant::now();
        let countdown = Countdown::new(Duration::from_secs(120), CancellationToken::new());
        assert_eq!(countdown.wait().await, CountdownOutcome::Elapsed);
        assert!(start.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_countdown_returns_early() {
        let token = CancellationToken::new();
        let countdown = Countdown::new(Duration::from_secs(3600), token.clone());
        token.cancel();

        let start = Instant::now();
        assert_eq!(countdown.wait().await, CountdownOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn gate_blocks_for_configured_minutes() {
        let gate = NotificationGate::new(Arc::new(DisabledMailer), CancellationToken::new());
        let mut environment = Environment {
            name: "prod".into(),
            ..Default::default()
        };
        environment.notifiers.countdown_minutes = 2;

        let log = UpdateLog::new("update", "prod");
        let start = Instant::now();
        gate.run(&environment, &log).await;
        assert!(start.elapsed() >= Duration::from_secs(120));
    }
}
