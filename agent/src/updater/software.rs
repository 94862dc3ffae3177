//! Software update plans: ordered commands, locations, configuration files
//! and databases.

use super::{Engine, RunContext, Scope};
use crate::errors::{UpdateError, UpdateResult};
use crate::model::{Command, Software, UpdatePlanItem};
use crate::services::commands::execute_shell_command;
use crate::types::{ResourceKind, ResourceRequest};

fn item_kind(item: &UpdatePlanItem) -> ResourceKind {
    match item {
        UpdatePlanItem::Command(_) => ResourceKind::Command,
        UpdatePlanItem::Location(_) => ResourceKind::Location,
        UpdatePlanItem::ConfigurationFile(_) => ResourceKind::ConfigurationFile,
        UpdatePlanItem::Database(_) => ResourceKind::Database,
    }
}

impl Engine {
    pub(crate) async fn update_software(&self, ctx: &RunContext, software: &Software) -> UpdateResult<()> {
        let kind = ResourceKind::Software;
        let env = ctx.environment();
        if self.skip_inactive(ctx, kind, software) {
            return Ok(());
        }
        if let Some(agent) = self.remote_owner(software, self.agent_id()) {
            let request = ResourceRequest::environment(&env.name).software(&software.name);
            return self.delegate_update(ctx, agent, kind, request).await;
        }

        ctx.log.info(format!("Updating software {}", software.name));
        let scope = self.software_scope(ctx, software);
        for item in &software.update_plan {
            let result = self.update_plan_item(ctx, &scope, item).await;
            self.apply_policy(ctx, item_kind(item), item.node(), result)?;
        }
        Ok(())
    }

    pub(crate) async fn check_software(&self, ctx: &RunContext, software: &Software) -> UpdateResult<bool> {
        let env = ctx.environment();
        if !software.active {
            return Ok(true);
        }
        if let Some(agent) = self.remote_owner(software, self.agent_id()) {
            let request = ResourceRequest::environment(&env.name).software(&software.name);
            return self
                .delegate_check(ctx, agent, ResourceKind::Software, request)
                .await;
        }

        let scope = self.software_scope(ctx, software);
        for item in &software.update_plan {
            if !self.check_plan_item(ctx, &scope, item).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) async fn update_plan_item(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        item: &UpdatePlanItem,
    ) -> UpdateResult<()> {
        match item {
            UpdatePlanItem::Command(command) => self.update_command(ctx, scope, command).await,
            UpdatePlanItem::Location(location) => self.update_location(ctx, scope, location).await,
            UpdatePlanItem::ConfigurationFile(file) => {
                self.update_configuration_file(ctx, scope, file).await
            }
            UpdatePlanItem::Database(database) => self.update_database(ctx, scope, database).await,
        }
    }

    pub(crate) async fn check_plan_item(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        item: &UpdatePlanItem,
    ) -> UpdateResult<bool> {
        match item {
            UpdatePlanItem::Command(command) => self.check_command(ctx, scope, command).await,
            UpdatePlanItem::Location(location) => self.check_location(ctx, scope, location).await,
            UpdatePlanItem::ConfigurationFile(file) => {
                self.check_configuration_file(ctx, scope, file).await
            }
            UpdatePlanItem::Database(database) => self.check_database(ctx, scope, database).await,
        }
    }

    async fn update_command(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        command: &Command,
    ) -> UpdateResult<()> {
        let kind = ResourceKind::Command;
        if self.skip_inactive(ctx, kind, command) {
            return Ok(());
        }
        if let Some(agent) = self.remote_owner(command, scope.agent) {
            let request = scope.request.clone().name(&command.name);
            return self.delegate_update(ctx, agent, kind, request).await;
        }

        let output = execute_shell_command(&command.command)
            .await
            .map_err(|e| UpdateError::controller(format!("command {}", command.name), e))?;
        for line in output.lines().filter(|line| !line.trim().is_empty()) {
            ctx.log.info(line.to_string());
        }

        ctx.log.mark_updated();
        ctx.log.info(format!("Command {} executed", command.name));
        Ok(())
    }

    /// Commands have no observable state and always run on update.
    async fn check_command(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        command: &Command,
    ) -> UpdateResult<bool> {
        if !command.active {
            return Ok(true);
        }
        if let Some(agent) = self.remote_owner(command, scope.agent) {
            let request = scope.request.clone().name(&command.name);
            return self
                .delegate_check(ctx, agent, ResourceKind::Command, request)
                .await;
        }
        Ok(false)
    }
}
