//! Rendering and mailing of update reports
//!
//! Templates are plain text with `{{environment}}`, `{{status}}`,
//! `{{updated}}`, `{{messages}}` and `{{run_id}}` placeholders. Without a
//! readable template the report is rendered as plain text.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

use crate::mailer::{Mail, Mailer};
use crate::model::Environment;
use crate::update_log::{Severity, UpdateReport};

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "INFO",
        Severity::Warn => "WARN",
        Severity::Error => "ERROR",
        Severity::Summary => "SUMMARY",
    }
}

fn render_messages(report: &UpdateReport) -> String {
    report
        .messages
        .iter()
        .map(|m| format!("[{}] {}", severity_tag(m.severity), m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_template(template: &str, report: &UpdateReport) -> String {
    template
        .replace("{{environment}}", &report.environment)
        .replace("{{status}}", &report.status)
        .replace("{{updated}}", if report.updated { "yes" } else { "no" })
        .replace("{{run_id}}", &report.run_id)
        .replace("{{messages}}", &render_messages(report))
}

pub fn render_plain(report: &UpdateReport) -> String {
    let mut out = format!(
        "{}\n\nEnvironment: {}\nStatus: {}\nUpdated: {}\nRun: {}\nStarted: {}\n",
        report.title,
        report.environment,
        report.status,
        if report.updated { "yes" } else { "no" },
        report.run_id,
        report.started_at.to_rfc3339(),
    );
    if let Some(finished) = report.finished_at {
        out.push_str(&format!("Finished: {}\n", finished.to_rfc3339()));
    }
    out.push('\n');
    out.push_str(&render_messages(report));
    out.push('\n');
    out
}

pub struct Publisher {
    mailer: Arc<dyn Mailer>,
    template: Option<PathBuf>,
}

impl Publisher {
    pub fn new(mailer: Arc<dyn Mailer>, template: Option<PathBuf>) -> Self {
        Self { mailer, template }
    }

    pub async fn render(&self, report: &UpdateReport) -> String {
        let Some(path) = &self.template else {
            return render_plain(report);
        };
        match fs::read_to_string(path).await {
            Ok(template) => render_template(&template, report),
            Err(e) => {
                warn!(
                    "Cannot read report template {}, using plain text: {}",
                    path.display(),
                    e
                );
                render_plain(report)
            }
        }
    }

    /// Mails the report to the environment's publishers. Failures are only
    /// logged.
    pub async fn publish(&self, environment: &Environment, report: &UpdateReport) {
        let recipients: Vec<String> = environment
            .publishers
            .recipients
            .iter()
            .map(|r| environment.substitute(r))
            .collect();
        if recipients.is_empty() {
            debug!("No publishers for environment {}", environment.name);
            return;
        }

        let mail = Mail {
            from: self.mailer.sender().to_string(),
            to: recipients,
            subject: format!("[jeefleet] {}: {}", report.environment, report.status),
            body: self.render(report).await,
        };
        if let Err(e) = self.mailer.send(&mail).await {
            warn!(
                "Cannot publish update report of environment {}: {}",
                environment.name, e
            );
        }
    }
}
