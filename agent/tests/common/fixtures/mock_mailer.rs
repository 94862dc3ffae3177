//! Mailer capturing outgoing mail instead of sending it

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use agent::mailer::{Mail, Mailer};

#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<Mail>>,
    failing: AtomicBool,
}

impl MockMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every delivery fails from now on.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|mail| mail.subject).collect()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, mail: &Mail) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("mail relay unavailable"));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }

    fn sender(&self) -> &str {
        "agent@test.local"
    }
}
