// File: agent/src/mailer.rs
//! Outbound mail for countdown notices and update reports
//!
//! Mail is handed to an HTTP mail relay as a JSON document. Callers log and
//! swallow delivery failures, so the trait reports them with `anyhow`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::MailConfig;
use crate::constants::http::MAIL_TIMEOUT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &Mail) -> Result<()>;

    /// Sender address used for outgoing mail.
    fn sender(&self) -> &str;
}

pub struct WebhookMailer {
    relay_url: String,
    from: String,
    client: Client,
}

impl WebhookMailer {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            relay_url: config.relay_url.clone(),
            from: config.from.clone(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, mail: &Mail) -> Result<()> {
        if mail.to.is_empty() {
            debug!("No recipients for '{}', skipping mail", mail.subject);
            return Ok(());
        }

        let response = timeout(
            MAIL_TIMEOUT,
            self.client.post(&self.relay_url).json(mail).send(),
        )
        .await
        .map_err(|_| anyhow!("Mail relay timeout for '{}'", mail.subject))?
        .map_err(|e| anyhow!("Mail relay request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Mail relay returned status {} for '{}'",
                response.status(),
                mail.subject
            ));
        }

        info!("Mail '{}' sent to {} recipient(s)", mail.subject, mail.to.len());
        Ok(())
    }

    fn sender(&self) -> &str {
        &self.from
    }
}

/// Used when no mail relay is configured.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, mail: &Mail) -> Result<()> {
        debug!("No mail relay configured, skipping '{}'", mail.subject);
        Ok(())
    }

    fn sender(&self) -> &str {
        crate::constants::defaults::MAIL_FROM
    }
}
