//! Application server updates.
//!
//! Resources are processed in a fixed order: JDBC connection pools, JDBC
//! data sources, JMS connection factories, JMS servers, JNDI bindings, shared
//! libraries, then applications. Once the run has changed something the
//! server is stopped, its caches purged and restarted, as its restart flags
//! require.

use tracing::{debug, warn};

use super::{capitalize, Engine, RunContext};
use crate::errors::{UpdateError, UpdateResult};
use crate::model::{effective_agent, ApplicationServer};
use crate::services::commands::{execute_shell_command, purge_directories, spawn_detached};
use crate::types::{ResourceKind, ResourceRequest};

impl Engine {
    pub(crate) async fn update_application_server(
        &self,
        ctx: &RunContext,
        server: &ApplicationServer,
    ) -> UpdateResult<()> {
        let kind = ResourceKind::ApplicationServer;
        let env = ctx.environment();
        if self.skip_inactive(ctx, kind, server) {
            return Ok(());
        }
        if let Some(agent) = self.remote_owner(server, self.agent_id()) {
            let request = ResourceRequest::environment(&env.name).server(&server.name);
            return self.delegate_update(ctx, agent, kind, request).await;
        }

        ctx.log.info(format!("Updating application server {}", server.name));
        let scope = self.server_scope(ctx, server);

        for pool in &server.jdbc_connection_pools {
            let result = self.update_connection_resource(ctx, &scope, pool).await;
            self.apply_policy(ctx, ResourceKind::JdbcConnectionPool, pool, result)?;
        }
        for source in &server.jdbc_data_sources {
            let result = self.update_connection_resource(ctx, &scope, source).await;
            self.apply_policy(ctx, ResourceKind::JdbcDataSource, source, result)?;
        }
        for factory in &server.jms_connection_factories {
            let result = self.update_connection_resource(ctx, &scope, factory).await;
            self.apply_policy(ctx, ResourceKind::JmsConnectionFactory, factory, result)?;
        }
        for jms_server in &server.jms_servers {
            let result = self.update_connection_resource(ctx, &scope, jms_server).await;
            self.apply_policy(ctx, ResourceKind::JmsServer, jms_server, result)?;
        }
        for binding in &server.jndi_bindings {
            let result = self.update_connection_resource(ctx, &scope, binding).await;
            self.apply_policy(ctx, ResourceKind::JndiBinding, binding, result)?;
        }
        for library in &server.shared_libraries {
            let result = self.update_connection_resource(ctx, &scope, library).await;
            self.apply_policy(ctx, ResourceKind::SharedLibrary, library, result)?;
        }
        for app in &server.applications {
            let result = self.update_application(ctx, &scope, app).await;
            self.apply_policy(ctx, ResourceKind::Application, app, result)?;
        }

        // Run-wide: a change anywhere earlier in this run also counts
        let changed = ctx.log.is_updated();
        let restart = server.update_requires_restart && changed;
        let clean_caches = server.cache_clean_requires_restart && changed;

        if restart {
            self.stop_server(ctx, server).await?;
        }
        if clean_caches {
            self.clean_server_caches(ctx, server).await?;
        }
        if restart {
            self.start_server(ctx, server).await?;
        }
        if !changed && (server.update_requires_restart || server.cache_clean_requires_restart) {
            ctx.log.info(format!(
                "Application server {} unchanged, no restart required",
                server.name
            ));
        }
        Ok(())
    }

    pub(crate) async fn check_application_server(
        &self,
        ctx: &RunContext,
        server: &ApplicationServer,
    ) -> UpdateResult<bool> {
        let env = ctx.environment();
        if !server.active {
            return Ok(true);
        }
        if let Some(agent) = self.remote_owner(server, self.agent_id()) {
            let request = ResourceRequest::environment(&env.name).server(&server.name);
            return self
                .delegate_check(ctx, agent, ResourceKind::ApplicationServer, request)
                .await;
        }

        let scope = self.server_scope(ctx, server);
        for pool in &server.jdbc_connection_pools {
            if !self.check_connection_resource(ctx, &scope, pool).await? {
                return Ok(false);
            }
        }
        for source in &server.jdbc_data_sources {
            if !self.check_connection_resource(ctx, &scope, source).await? {
                return Ok(false);
            }
        }
        for factory in &server.jms_connection_factories {
            if !self.check_connection_resource(ctx, &scope, factory).await? {
                return Ok(false);
            }
        }
        for jms_server in &server.jms_servers {
            if !self.check_connection_resource(ctx, &scope, jms_server).await? {
                return Ok(false);
            }
        }
        for binding in &server.jndi_bindings {
            if !self.check_connection_resource(ctx, &scope, binding).await? {
                return Ok(false);
            }
        }
        for library in &server.shared_libraries {
            if !self.check_connection_resource(ctx, &scope, library).await? {
                return Ok(false);
            }
        }
        for app in &server.applications {
            if !self.check_application(ctx, &scope, app).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn stop_server(&self, ctx: &RunContext, server: &ApplicationServer) -> UpdateResult<()> {
        let label = format!("application server {}", server.name);

        if server.use_jmx_stop {
            self.controllers.controller_for(server)?.shutdown().await?;
        } else if !server.shutdown_command.is_empty() {
            execute_shell_command(&server.shutdown_command)
                .await
                .map_err(|e| UpdateError::controller(&label, e))?;
        } else {
            return Err(UpdateError::Configuration(format!(
                "{} requires a restart but declares no shutdown command",
                label
            )));
        }

        ctx.log.info(format!("{} stopped", capitalize(&label)));
        Ok(())
    }

    async fn clean_server_caches(
        &self,
        ctx: &RunContext,
        server: &ApplicationServer,
    ) -> UpdateResult<()> {
        let purged = purge_directories(&server.cache_dirs)
            .await
            .map_err(|e| UpdateError::cache_io(server.cache_dirs.join(", "), e))?;
        ctx.log.info(format!(
            "{} cache director{} of application server {} cleaned",
            purged,
            if purged == 1 { "y" } else { "ies" },
            server.name
        ));
        Ok(())
    }

    async fn start_server(&self, ctx: &RunContext, server: &ApplicationServer) -> UpdateResult<()> {
        let label = format!("application server {}", server.name);
        if server.startup_command.is_empty() {
            return Err(UpdateError::Configuration(format!(
                "{} requires a restart but declares no startup command",
                label
            )));
        }

        self.admit_start(ctx, server).await?;

        let pid = spawn_detached(&server.startup_command)
            .await
            .map_err(|e| UpdateError::controller(&label, e))?;
        ctx.log.info(format!("{} started (pid {})", capitalize(&label), pid));
        Ok(())
    }

    /// Refuses a start when the agent already runs its maximum number of
    /// application servers, counted across every environment.
    async fn admit_start(&self, ctx: &RunContext, server: &ApplicationServer) -> UpdateResult<()> {
        let local = self.agent_id();
        let Ok(agent) = ctx.fleet.agent(local) else {
            debug!("Agent {} not declared in the fleet, no start limit", local);
            return Ok(());
        };
        let maximum = agent.max_running_servers;
        if maximum == 0 {
            return Ok(());
        }

        let current_env = &ctx.environment().name;
        let mut running = 0;

        for env in &ctx.fleet.environments {
            for other in &env.application_servers {
                if !other.active
                    || self.router.is_remote(effective_agent(other, local))
                    || (&env.name == current_env && other.name == server.name)
                {
                    continue;
                }

                let controller = match self.controllers.controller_for(other) {
                    Ok(controller) => controller,
                    Err(e) => {
                        debug!("Not counting application server {}: {}", other.name, e);
                        continue;
                    }
                };
                match controller.is_stopped().await {
                    Ok(true) => {}
                    Ok(false) => running += 1,
                    Err(e) => warn!(
                        "Cannot get status of application server {} in {}: {}",
                        other.name, env.name, e
                    ),
                }
            }
        }

        if running >= maximum {
            return Err(UpdateError::controller(
                format!("application server {}", server.name),
                format!(
                    "{} application servers already running on agent {} (maximum {})",
                    running, local, maximum
                ),
            ));
        }
        Ok(())
    }
}
