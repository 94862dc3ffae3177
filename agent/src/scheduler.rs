//! Cron-driven environment updates
//!
//! Each agent declares at most one schedule (`cron` on its fleet entry, 6-field
//! format: sec min hour day month dow). On every tick the fleet is reloaded and
//! each environment owned by this agent with `auto_update` set is updated as a
//! client run, so notices and reports go out as for a manual update.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, instrument, warn};

use crate::updater::Engine;

pub struct UpdateScheduler {
    engine: Arc<Engine>,
    scheduler: JobScheduler,
}

impl UpdateScheduler {
    pub async fn new(engine: Arc<Engine>) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;
        Ok(Self { engine, scheduler })
    }

    /// Registers the agent schedule, if any, and starts ticking. Returns
    /// whether a job was scheduled.
    #[instrument(skip(self), fields(agent = %self.engine.agent_id()))]
    pub async fn start(&self) -> Result<bool> {
        let fleet = self.engine.load_fleet().await?;
        let Some(schedule) = fleet
            .agent(self.engine.agent_id())
            .ok()
            .and_then(|agent| agent.cron.clone())
        else {
            info!("No update schedule configured for this agent");
            return Ok(false);
        };

        validate_6_field_cron(&schedule)
            .map_err(|e| anyhow!("Invalid 6-field cron schedule '{}': {}", schedule, e))?;

        let engine = self.engine.clone();
        let job = Job::new_async(schedule.as_str(), move |_uuid, _scheduler| {
            let engine = engine.clone();
            Box::pin(async move {
                run_scheduled_updates(&engine).await;
            })
        })
        .map_err(|e| anyhow!("Failed to create update job for '{}': {}", schedule, e))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to add update job to scheduler: {}", e))?;
        self.scheduler.start().await?;

        info!("Update scheduler started with schedule '{}'", schedule);
        Ok(true)
    }
}

/// One scheduler tick: updates every auto-update environment owned by this
/// agent, one after the other.
pub async fn run_scheduled_updates(engine: &Engine) {
    let fleet = match engine.load_fleet().await {
        Ok(fleet) => fleet,
        Err(e) => {
            error!("Scheduled update skipped, cannot load fleet model: {}", e);
            return;
        }
    };

    let owned: Vec<String> = fleet
        .environments
        .iter()
        .filter(|env| env.agent == engine.agent_id())
        .map(|env| env.name.clone())
        .collect();

    for environment in owned {
        match engine.scheduled_update(&environment).await {
            Ok(Some(outcome)) => info!(
                "Scheduled update of {} finished (updated: {})",
                environment, outcome.updated
            ),
            Ok(None) => {}
            Err(e) => warn!("Scheduled update of {} failed: {}", environment, e),
        }
    }
}

fn validate_6_field_cron(schedule: &str) -> Result<()> {
    let parts: Vec<&str> = schedule.split_whitespace().collect();
    if parts.len() != 6 {
        return Err(anyhow!(
            "tokio-cron-scheduler requires exactly 6 fields: second minute hour day month dayofweek. Got {} fields: '{}'",
            parts.len(),
            schedule
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_field_schedules_are_accepted() {
        assert!(validate_6_field_cron("0 30 2 * * *").is_ok());
        assert!(validate_6_field_cron("0 */15 * * * 1-5").is_ok());
    }

    #[test]
    fn five_field_schedules_are_rejected() {
        let err = validate_6_field_cron("30 2 * * *").unwrap_err();
        assert!(err.to_string().contains("Got 5 fields"));
    }
}
