// File: agent/src/updater/environment.rs
use tracing::info;

use super::{Engine, RunContext};
use crate::errors::UpdateResult;
use crate::types::{ResourceKind, ResourceRequest, UpdateOutcome};

impl Engine {
    /// Application servers first, then software, each under the blocker
    /// policy.
    pub(crate) async fn update_environment(&self, ctx: &RunContext) -> UpdateResult<()> {
        let env = ctx.environment();
        ctx.log.info(format!("Updating environment {}", env.name));

        for server in &env.application_servers {
            let result = self.update_application_server(ctx, server).await;
            self.apply_policy(ctx, ResourceKind::ApplicationServer, server, result)?;
        }
        for software in &env.software {
            let result = self.update_software(ctx, software).await;
            self.apply_policy(ctx, ResourceKind::Software, software, result)?;
        }
        Ok(())
    }

    pub(crate) async fn check_environment(&self, ctx: &RunContext) -> UpdateResult<bool> {
        let env = ctx.environment();
        for server in &env.application_servers {
            if !self.check_application_server(ctx, server).await? {
                return Ok(false);
            }
        }
        for software in &env.software {
            if !self.check_software(ctx, software).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Entry point of scheduler ticks. Environments without auto update are
    /// left alone; `None` means nothing ran.
    pub async fn scheduled_update(&self, environment: &str) -> UpdateResult<Option<UpdateOutcome>> {
        let fleet = self.load_fleet().await?;
        let env = fleet.environment(environment)?;
        if !env.auto_update {
            info!("Auto update disabled for environment {}, skipping", environment);
            return Ok(None);
        }

        info!("Scheduled update of environment {}", environment);
        let outcome = self
            .update(ResourceKind::Environment, ResourceRequest::environment(environment))
            .await?;
        Ok(Some(outcome))
    }
}
