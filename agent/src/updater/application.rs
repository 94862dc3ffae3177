// File: agent/src/updater/application.rs
use super::{Engine, RunContext, Scope};
use crate::content_manager::ContentScope;
use crate::errors::{UpdateError, UpdateResult};
use crate::model::{Application, ContentManager};
use crate::types::ResourceKind;

impl Engine {
    /// Configuration files, databases, content managers then archives, each
    /// under the blocker policy.
    pub(crate) async fn update_application(
        &self,
        ctx: &RunContext,
        server_scope: &Scope<'_>,
        app: &Application,
    ) -> UpdateResult<()> {
        let kind = ResourceKind::Application;
        if self.skip_inactive(ctx, kind, app) {
            return Ok(());
        }
        if let Some(agent) = self.remote_owner(app, server_scope.agent) {
            let request = server_scope.request.clone().application(&app.name);
            return self.delegate_update(ctx, agent, kind, request).await;
        }
        let server = server_scope.server.ok_or_else(|| {
            UpdateError::Configuration(format!(
                "application '{}' outside an application server",
                app.name
            ))
        })?;

        ctx.log.info(format!("Updating application {}", app.name));
        let scope = self.application_scope(ctx, server, app);

        for file in &app.configuration_files {
            let result = self.update_configuration_file(ctx, &scope, file).await;
            self.apply_policy(ctx, ResourceKind::ConfigurationFile, file, result)?;
        }
        for database in &app.databases {
            let result = self.update_database(ctx, &scope, database).await;
            self.apply_policy(ctx, ResourceKind::Database, database, result)?;
        }
        for manager in &app.content_managers {
            let result = self.update_content_manager(ctx, &scope, manager).await;
            self.apply_policy(ctx, ResourceKind::ContentManager, manager, result)?;
        }
        for archive in &app.archives {
            let result = self.update_archive(ctx, &scope, archive).await;
            self.apply_policy(ctx, ResourceKind::Archive, archive, result)?;
        }
        Ok(())
    }

    pub(crate) async fn check_application(
        &self,
        ctx: &RunContext,
        server_scope: &Scope<'_>,
        app: &Application,
    ) -> UpdateResult<bool> {
        if !app.active {
            return Ok(true);
        }
        if let Some(agent) = self.remote_owner(app, server_scope.agent) {
            let request = server_scope.request.clone().application(&app.name);
            return self
                .delegate_check(ctx, agent, ResourceKind::Application, request)
                .await;
        }
        let Some(server) = server_scope.server else {
            return Ok(false);
        };
        let scope = self.application_scope(ctx, server, app);

        for file in &app.configuration_files {
            if !self.check_configuration_file(ctx, &scope, file).await? {
                return Ok(false);
            }
        }
        for database in &app.databases {
            if !self.check_database(ctx, &scope, database).await? {
                return Ok(false);
            }
        }
        for manager in &app.content_managers {
            if !self.check_content_manager(ctx, &scope, manager).await? {
                return Ok(false);
            }
        }
        for archive in &app.archives {
            if !self.check_archive(ctx, &scope, archive).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) async fn update_content_manager(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        manager: &ContentManager,
    ) -> UpdateResult<()> {
        let kind = ResourceKind::ContentManager;
        if self.skip_inactive(ctx, kind, manager) {
            return Ok(());
        }
        if let Some(agent) = self.remote_owner(manager, scope.agent) {
            let request = scope.request.clone().name(&manager.name);
            return self.delegate_update(ctx, agent, kind, request).await;
        }

        let plugin = self
            .content_managers
            .create(&manager.classname, &manager.properties)?;
        let content_scope = ContentScope {
            environment: ctx.environment().name.clone(),
            server: scope.request.server.clone().unwrap_or_default(),
            application: scope.request.application.clone().unwrap_or_default(),
        };
        plugin.run(&content_scope).await?;

        ctx.log.mark_updated();
        ctx.log.info(format!("Content manager {} executed", manager.name));
        Ok(())
    }

    /// Content managers have no observable state: they always run on update.
    pub(crate) async fn check_content_manager(
        &self,
        ctx: &RunContext,
        scope: &Scope<'_>,
        manager: &ContentManager,
    ) -> UpdateResult<bool> {
        if !manager.active {
            return Ok(true);
        }
        if let Some(agent) = self.remote_owner(manager, scope.agent) {
            let request = scope.request.clone().name(&manager.name);
            return self
                .delegate_check(ctx, agent, ResourceKind::ContentManager, request)
                .await;
        }
        self.content_managers
            .create(&manager.classname, &manager.properties)?;
        Ok(false)
    }
}
