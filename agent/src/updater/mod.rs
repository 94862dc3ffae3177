//! Update orchestration engine
//!
//! [`Engine::update`] and [`Engine::check`] are the entry points of every
//! RPC call and scheduled run. A call reloads the fleet model, resolves the
//! addressed node (failing before any side effect when it does not exist),
//! then walks the sub-tree in declaration order. Each node is either skipped
//! (inactive), delegated to its owning agent, or handled locally through the
//! controller, the change detector or the shell. Composite nodes apply the
//! blocker policy to their children.

mod application;
mod database;
mod environment;
mod files;
mod resources;
mod server;
mod software;

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::change_detector::{CacheLayout, ChangeDetector};
use crate::config::AgentConfig;
use crate::content_manager::ContentManagerRegistry;
use crate::controller::{Controller, ControllerRegistry};
use crate::delegation::{AgentClient, DelegationRouter, HttpAgentClient, Inbound};
use crate::errors::{UpdateError, UpdateResult};
use crate::journal::{Journal, JournalEvent};
use crate::mailer::{DisabledMailer, Mailer, WebhookMailer};
use crate::model::{
    effective_agent, find, Application, ApplicationServer, Archive, ConfigurationFile, ContentManager,
    Database, Environment, Fleet, JdbcConnectionPool, JdbcDataSource, JmsConnectionFactory,
    JmsServer, JndiBinding, ModelStore, Node, SharedLibrary, Software, SqlScript,
    UpdatePlanItem,
};
use crate::notifier::NotificationGate;
use crate::publisher::Publisher;
use crate::types::{ResourceKind, ResourceRequest, UpdateOutcome};
use crate::update_log::{Severity, UpdateLog};

/// State of one top-level or delegated call.
pub struct RunContext {
    pub fleet: Fleet,
    env: usize,
    pub log: UpdateLog,
    pub inbound: Option<Inbound>,
}

impl RunContext {
    pub fn environment(&self) -> &Environment {
        &self.fleet.environments[self.env]
    }

    pub fn is_delegated(&self) -> bool {
        self.inbound.is_some()
    }
}

/// Where the children of a composite node live.
pub(crate) struct Scope<'a> {
    pub server: Option<&'a ApplicationServer>,
    /// Artifact against which relative URIs resolve
    pub uri: &'a str,
    /// Cache directory of the parent artifact
    pub cache: PathBuf,
    /// Request addressing the parent; children add their own name
    pub request: ResourceRequest,
    /// Owning agent inherited by children that do not name one
    pub agent: &'a str,
}

/// A node of the model addressed by a request.
pub(crate) enum Target<'a> {
    Environment,
    ApplicationServer(&'a ApplicationServer),
    JdbcConnectionPool(&'a ApplicationServer, &'a JdbcConnectionPool),
    JdbcDataSource(&'a ApplicationServer, &'a JdbcDataSource),
    JmsConnectionFactory(&'a ApplicationServer, &'a JmsConnectionFactory),
    JmsServer(&'a ApplicationServer, &'a JmsServer),
    JndiBinding(&'a ApplicationServer, &'a JndiBinding),
    SharedLibrary(&'a ApplicationServer, &'a SharedLibrary),
    Application(&'a ApplicationServer, &'a Application),
    Archive(&'a ApplicationServer, &'a Application, &'a Archive),
    ConfigurationFile(&'a ApplicationServer, &'a Application, &'a ConfigurationFile),
    Database(&'a ApplicationServer, &'a Application, &'a Database),
    SqlScript(&'a ApplicationServer, &'a Application, &'a Database, &'a SqlScript),
    ContentManager(&'a ApplicationServer, &'a Application, &'a ContentManager),
    Software(&'a Software),
    PlanItem(&'a Software, &'a UpdatePlanItem),
    PlanSqlScript(&'a Software, &'a Database, &'a SqlScript),
}

fn required<'r>(value: &'r Option<String>, field: &str, kind: ResourceKind) -> UpdateResult<&'r str> {
    value.as_deref().ok_or_else(|| {
        UpdateError::Configuration(format!("{} request requires '{}'", kind, field))
    })
}

pub struct Engine {
    config: Arc<AgentConfig>,
    store: Arc<dyn ModelStore>,
    controllers: ControllerRegistry,
    content_managers: ContentManagerRegistry,
    router: DelegationRouter,
    detector: ChangeDetector,
    cache: CacheLayout,
    journal: Journal,
    mailer: Arc<dyn Mailer>,
    shutdown: CancellationToken,
}

impl Engine {
    pub fn new(config: Arc<AgentConfig>, store: Arc<dyn ModelStore>) -> Self {
        let mailer: Arc<dyn Mailer> = match &config.mail {
            Some(mail) => Arc::new(WebhookMailer::new(mail)),
            None => Arc::new(DisabledMailer),
        };
        let client = Arc::new(HttpAgentClient::new(config.api_key.clone()));

        Self {
            router: DelegationRouter::new(config.agent_id.clone(), client),
            cache: CacheLayout::new(&config.cache_dir),
            journal: Journal::new(&config.journal_dir),
            controllers: ControllerRegistry::new(),
            content_managers: ContentManagerRegistry::with_builtins(),
            detector: ChangeDetector::new(),
            shutdown: CancellationToken::new(),
            mailer,
            config,
            store,
        }
    }

    pub fn with_controllers(mut self, controllers: ControllerRegistry) -> Self {
        self.controllers = controllers;
        self
    }

    pub fn with_content_managers(mut self, content_managers: ContentManagerRegistry) -> Self {
        self.content_managers = content_managers;
        self
    }

    pub fn with_agent_client(mut self, client: Arc<dyn AgentClient>) -> Self {
        self.router = DelegationRouter::new(self.config.agent_id.clone(), client);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.config.agent_id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub async fn load_fleet(&self) -> UpdateResult<Fleet> {
        self.store.load().await
    }

    /// Cancels pending countdowns; runs waiting on one proceed immediately.
    pub fn interrupt_countdowns(&self) {
        self.shutdown.cancel();
    }

    async fn context(
        &self,
        kind: ResourceKind,
        request: &ResourceRequest,
        title: String,
    ) -> UpdateResult<RunContext> {
        let mut fleet = self.store.load().await?;
        let env = fleet
            .environments
            .iter()
            .position(|e| e.name == request.environment)
            .ok_or_else(|| UpdateError::not_found("environment", &request.environment))?;

        for environment in fleet.environments.iter_mut() {
            *environment = environment.resolved()?;
        }

        let inbound = request.delegation.then(|| Inbound {
            kind,
            request: request.clone(),
        });

        Ok(RunContext {
            log: UpdateLog::new(title, &request.environment),
            fleet,
            env,
            inbound,
        })
    }

    /// Finds the addressed node; nothing is touched when it does not exist.
    fn locate<'a>(
        &self,
        ctx: &'a RunContext,
        kind: ResourceKind,
        request: &ResourceRequest,
    ) -> UpdateResult<Target<'a>> {
        let env = ctx.environment();

        if let Some(software_name) = request.software.as_deref() {
            let software = env.software(software_name)?;
            return match kind {
                ResourceKind::Software => Ok(Target::Software(software)),
                ResourceKind::SqlScript => {
                    let database = match software.item(required(&request.database, "database", kind)?)? {
                        UpdatePlanItem::Database(db) => db,
                        _ => return Err(UpdateError::not_found("database", request.database.clone().unwrap_or_default())),
                    };
                    let script = database.sql_script(required(&request.name, "name", kind)?)?;
                    Ok(Target::PlanSqlScript(software, database, script))
                }
                ResourceKind::Command
                | ResourceKind::Location
                | ResourceKind::ConfigurationFile
                | ResourceKind::Database => {
                    let name = required(&request.name, "name", kind)?;
                    let item = software.item(name)?;
                    let matches = matches!(
                        (kind, item),
                        (ResourceKind::Command, UpdatePlanItem::Command(_))
                            | (ResourceKind::Location, UpdatePlanItem::Location(_))
                            | (ResourceKind::ConfigurationFile, UpdatePlanItem::ConfigurationFile(_))
                            | (ResourceKind::Database, UpdatePlanItem::Database(_))
                    );
                    if !matches {
                        return Err(UpdateError::not_found(kind.label(), name));
                    }
                    Ok(Target::PlanItem(software, item))
                }
                _ => Err(UpdateError::Configuration(format!(
                    "{} is not part of a software update plan",
                    kind.label()
                ))),
            };
        }

        if kind == ResourceKind::Environment {
            return Ok(Target::Environment);
        }
        if matches!(
            kind,
            ResourceKind::Software | ResourceKind::Command | ResourceKind::Location
        ) {
            return Err(UpdateError::Configuration(format!(
                "{} request requires 'software'",
                kind
            )));
        }

        let server = env.application_server(required(&request.server, "server", kind)?)?;
        let name = || required(&request.name, "name", kind);

        let target = match kind {
            ResourceKind::ApplicationServer => Target::ApplicationServer(server),
            ResourceKind::JdbcConnectionPool => {
                Target::JdbcConnectionPool(server, server.jdbc_connection_pool(name()?)?)
            }
            ResourceKind::JdbcDataSource => Target::JdbcDataSource(
                server,
                find(&server.jdbc_data_sources, "JDBC data source", name()?)?,
            ),
            ResourceKind::JmsConnectionFactory => Target::JmsConnectionFactory(
                server,
                find(
                    &server.jms_connection_factories,
                    "JMS connection factory",
                    name()?,
                )?,
            ),
            ResourceKind::JmsServer => Target::JmsServer(
                server,
                find(&server.jms_servers, "JMS server", name()?)?,
            ),
            ResourceKind::JndiBinding => Target::JndiBinding(
                server,
                find(&server.jndi_bindings, "JNDI binding", name()?)?,
            ),
            ResourceKind::SharedLibrary => Target::SharedLibrary(
                server,
                find(&server.shared_libraries, "shared library", name()?)?,
            ),
            _ => {
                let app = server.application(required(&request.application, "application", kind)?)?;
                match kind {
                    ResourceKind::Application => Target::Application(server, app),
                    ResourceKind::Archive => Target::Archive(
                        server,
                        app,
                        find(&app.archives, "archive", name()?)?,
                    ),
                    ResourceKind::ConfigurationFile => Target::ConfigurationFile(
                        server,
                        app,
                        find(&app.configuration_files, "configuration file", name()?)?,
                    ),
                    ResourceKind::Database => Target::Database(
                        server,
                        app,
                        find(&app.databases, "database", name()?)?,
                    ),
                    ResourceKind::SqlScript => {
                        let db = find(
                            &app.databases,
                            "database",
                            required(&request.database, "database", kind)?,
                        )?;
                        Target::SqlScript(server, app, db, db.sql_script(name()?)?)
                    }
                    ResourceKind::ContentManager => Target::ContentManager(
                        server,
                        app,
                        find(&app.content_managers, "content manager", name()?)?,
                    ),
                    _ => {
                        return Err(UpdateError::Configuration(format!(
                            "unsupported {} request",
                            kind
                        )))
                    }
                }
            }
        };
        Ok(target)
    }

    fn describe(kind: ResourceKind, request: &ResourceRequest) -> String {
        match kind {
            ResourceKind::Environment => format!("environment {}", request.environment),
            ResourceKind::ApplicationServer => format!(
                "application server {}",
                request.server.as_deref().unwrap_or_default()
            ),
            ResourceKind::Application => format!(
                "application {}",
                request.application.as_deref().unwrap_or_default()
            ),
            ResourceKind::Software => format!(
                "software {}",
                request.software.as_deref().unwrap_or_default()
            ),
            _ => format!(
                "{} {}",
                kind.label(),
                request.name.as_deref().unwrap_or_default()
            ),
        }
    }

    /// Updates the addressed node and everything below it.
    ///
    /// Client-initiated composite runs (environment, application server,
    /// application, software) are journaled, preceded by the countdown notice
    /// and published at the end, whatever their outcome. Delegated runs skip
    /// notice and publication.
    #[instrument(skip(self, request), fields(agent = %self.config.agent_id, environment = %request.environment, delegated = request.delegation))]
    pub async fn update(
        &self,
        kind: ResourceKind,
        request: ResourceRequest,
    ) -> UpdateResult<UpdateOutcome> {
        let target_name = Self::describe(kind, &request);
        let ctx = self
            .context(kind, &request, format!("Update of {}", target_name))
            .await?;
        let target = self.locate(&ctx, kind, &request)?;

        let composite = matches!(
            kind,
            ResourceKind::Environment
                | ResourceKind::ApplicationServer
                | ResourceKind::Application
                | ResourceKind::Software
        );
        let client_run = !ctx.is_delegated();
        let environment = ctx.environment();

        if composite {
            self.warn_unknown_content_managers(environment);
            self.record_journal(
                environment,
                Severity::Info,
                format!("Update of {} started", target_name),
            )
            .await;
        }
        if composite && client_run {
            NotificationGate::new(self.mailer.clone(), self.shutdown.clone())
                .run(environment, &ctx.log)
                .await;
        }

        let result = self.update_target(&ctx, &target).await;

        let status = match &result {
            Ok(()) if ctx.log.is_updated() => format!("{} updated", capitalize(&target_name)),
            Ok(()) => format!("{} already up to date", capitalize(&target_name)),
            Err(e) => format!("{} update failed: {}", capitalize(&target_name), e),
        };
        match &result {
            Ok(()) => ctx.log.summary(status.clone()),
            Err(_) => ctx.log.error(status.clone()),
        }
        ctx.log.set_status(status.clone());

        if composite {
            let severity = if result.is_ok() { Severity::Info } else { Severity::Error };
            self.record_journal(environment, severity, status).await;
        }

        let report = ctx.log.finish();
        if let Err(e) = report.persist(&self.config.log_dir).await {
            warn!("Cannot persist update log {}: {}", report.run_id, e);
        }
        if composite && client_run {
            Publisher::new(self.mailer.clone(), self.config.report_template.clone())
                .publish(environment, &report)
                .await;
        }

        result.map(|()| UpdateOutcome {
            updated: report.updated,
            messages: report.messages,
        })
    }

    /// Read-only counterpart of [`Engine::update`]: true when the addressed
    /// node is in the declared state.
    #[instrument(skip(self, request), fields(agent = %self.config.agent_id, environment = %request.environment))]
    pub async fn check(&self, kind: ResourceKind, request: ResourceRequest) -> UpdateResult<bool> {
        let ctx = self
            .context(kind, &request, format!("Check of {}", Self::describe(kind, &request)))
            .await?;
        let target = self.locate(&ctx, kind, &request)?;
        self.check_target(&ctx, &target).await
    }

    async fn update_target(&self, ctx: &RunContext, target: &Target<'_>) -> UpdateResult<()> {
        match *target {
            Target::Environment => self.update_environment(ctx).await,
            Target::ApplicationServer(server) => self.update_application_server(ctx, server).await,
            Target::JdbcConnectionPool(server, r) => {
                self.update_connection_resource(ctx, &self.server_scope(ctx, server), r).await
            }
            Target::JdbcDataSource(server, r) => {
                self.update_connection_resource(ctx, &self.server_scope(ctx, server), r).await
            }
            Target::JmsConnectionFactory(server, r) => {
                self.update_connection_resource(ctx, &self.server_scope(ctx, server), r).await
            }
            Target::JmsServer(server, r) => {
                self.update_connection_resource(ctx, &self.server_scope(ctx, server), r).await
            }
            Target::JndiBinding(server, r) => {
                self.update_connection_resource(ctx, &self.server_scope(ctx, server), r).await
            }
            Target::SharedLibrary(server, r) => {
                self.update_connection_resource(ctx, &self.server_scope(ctx, server), r).await
            }
            Target::Application(server, app) => {
                self.update_application(ctx, &self.server_scope(ctx, server), app).await
            }
            Target::Archive(server, app, archive) => {
                self.update_archive(ctx, &self.application_scope(ctx, server, app), archive).await
            }
            Target::ConfigurationFile(server, app, file) => {
                self.update_configuration_file(ctx, &self.application_scope(ctx, server, app), file)
                    .await
            }
            Target::Database(server, app, db) => {
                self.update_database(ctx, &self.application_scope(ctx, server, app), db).await
            }
            Target::SqlScript(server, app, db, script) => {
                self.update_sql_script(ctx, &self.application_scope(ctx, server, app), db, script)
                    .await
            }
            Target::ContentManager(server, app, manager) => {
                self.update_content_manager(ctx, &self.application_scope(ctx, server, app), manager)
                    .await
            }
            Target::Software(software) => self.update_software(ctx, software).await,
            Target::PlanItem(software, item) => {
                self.update_plan_item(ctx, &self.software_scope(ctx, software), item).await
            }
            Target::PlanSqlScript(software, db, script) => {
                self.update_sql_script(ctx, &self.software_scope(ctx, software), db, script)
                    .await
            }
        }
    }

    async fn check_target(&self, ctx: &RunContext, target: &Target<'_>) -> UpdateResult<bool> {
        match *target {
            Target::Environment => self.check_environment(ctx).await,
            Target::ApplicationServer(server) => self.check_application_server(ctx, server).await,
            Target::JdbcConnectionPool(server, r) => {
                self.check_connection_resource(ctx, &self.server_scope(ctx, server), r).await
            }
            Target::JdbcDataSource(server, r) => {
                self.check_connection_resource(ctx, &self.server_scope(ctx, server), r).await
            }
            Target::JmsConnectionFactory(server, r) => {
                self.check_connection_resource(ctx, &self.server_scope(ctx, server), r).await
            }
            Target::JmsServer(server, r) => {
                self.check_connection_resource(ctx, &self.server_scope(ctx, server), r).await
            }
            Target::JndiBinding(server, r) => {
                self.check_connection_resource(ctx, &self.server_scope(ctx, server), r).await
            }
            Target::SharedLibrary(server, r) => {
                self.check_connection_resource(ctx, &self.server_scope(ctx, server), r).await
            }
            Target::Application(server, app) => {
                self.check_application(ctx, &self.server_scope(ctx, server), app).await
            }
            Target::Archive(server, app, archive) => {
                self.check_archive(ctx, &self.application_scope(ctx, server, app), archive).await
            }
            Target::ConfigurationFile(server, app, file) => {
                self.check_configuration_file(ctx, &self.application_scope(ctx, server, app), file)
                    .await
            }
            Target::Database(server, app, db) => {
                self.check_database(ctx, &self.application_scope(ctx, server, app), db).await
            }
            Target::SqlScript(server, app, db, script) => {
                self.check_sql_script(ctx, &self.application_scope(ctx, server, app), db, script)
                    .await
            }
            Target::ContentManager(server, app, manager) => {
                self.check_content_manager(ctx, &self.application_scope(ctx, server, app), manager)
                    .await
            }
            Target::Software(software) => self.check_software(ctx, software).await,
            Target::PlanItem(software, item) => {
                self.check_plan_item(ctx, &self.software_scope(ctx, software), item).await
            }
            Target::PlanSqlScript(software, db, script) => {
                self.check_sql_script(ctx, &self.software_scope(ctx, software), db, script)
                    .await
            }
        }
    }

    // === SCOPES ===

    /// Scope of a server's children, as seen from the environment.
    pub(crate) fn server_scope<'a>(
        &'a self,
        ctx: &'a RunContext,
        server: &'a ApplicationServer,
    ) -> Scope<'a> {
        let env = ctx.environment();
        Scope {
            server: Some(server),
            uri: "",
            cache: PathBuf::new(),
            request: ResourceRequest::environment(&env.name).server(&server.name),
            agent: effective_agent(server, self.agent_id()),
        }
    }

    pub(crate) fn application_scope<'a>(
        &'a self,
        ctx: &'a RunContext,
        server: &'a ApplicationServer,
        app: &'a Application,
    ) -> Scope<'a> {
        let env = ctx.environment();
        let server_agent = effective_agent(server, self.agent_id());
        Scope {
            server: Some(server),
            uri: &app.uri,
            cache: self.cache.application(&env.name, &app.name),
            request: ResourceRequest::environment(&env.name)
                .server(&server.name)
                .application(&app.name),
            agent: effective_agent(app, server_agent),
        }
    }

    pub(crate) fn software_scope<'a>(&'a self, ctx: &'a RunContext, software: &'a Software) -> Scope<'a> {
        let env = ctx.environment();
        Scope {
            server: None,
            uri: &software.uri,
            cache: self.cache.software(&env.name, &software.name),
            request: ResourceRequest::environment(&env.name).software(&software.name),
            agent: effective_agent(software, self.agent_id()),
        }
    }

    // === SHARED NODE HANDLING ===

    /// Logs and reports an inactive node.
    pub(crate) fn skip_inactive(&self, ctx: &RunContext, kind: ResourceKind, node: &dyn Node) -> bool {
        if node.active() {
            return false;
        }
        ctx.log.info(format!(
            "{} {} is not active, skipping",
            capitalize(kind.label()),
            node.name()
        ));
        true
    }

    /// The agent owning `node`, when it is not this one.
    pub(crate) fn remote_owner<'a>(&self, node: &'a dyn Node, inherited: &'a str) -> Option<&'a str> {
        let owner = effective_agent(node, inherited);
        self.router.is_remote(owner).then_some(owner)
    }

    pub(crate) async fn delegate_update(
        &self,
        ctx: &RunContext,
        agent: &str,
        kind: ResourceKind,
        request: ResourceRequest,
    ) -> UpdateResult<()> {
        self.router
            .update(&ctx.fleet, agent, kind, request, ctx.inbound.as_ref(), &ctx.log)
            .await
    }

    pub(crate) async fn delegate_check(
        &self,
        ctx: &RunContext,
        agent: &str,
        kind: ResourceKind,
        request: ResourceRequest,
    ) -> UpdateResult<bool> {
        self.router
            .check(&ctx.fleet, agent, kind, request, ctx.inbound.as_ref())
            .await
    }

    pub(crate) fn controller(&self, scope: &Scope<'_>) -> UpdateResult<Arc<dyn Controller>> {
        let server = scope.server.ok_or_else(|| {
            UpdateError::Configuration("resource requires an application server".to_string())
        })?;
        self.controllers.controller_for(server)
    }

    /// Blocker policy applied by composites to each child outcome.
    pub(crate) fn apply_policy(
        &self,
        ctx: &RunContext,
        kind: ResourceKind,
        node: &dyn Node,
        result: UpdateResult<()>,
    ) -> UpdateResult<()> {
        let Err(err) = result else {
            return Ok(());
        };
        let label = format!("{} {}", capitalize(kind.label()), node.name());

        if node.blocker() {
            ctx.log.error(format!("{} update failed: {}", label, err));
            Err(UpdateError::blocked(format!("{} '{}'", kind.label(), node.name()), err))
        } else {
            ctx.log.warn(format!("{} update failed: {}", label, err));
            ctx.log.info(format!("{} is not update blocker, update continues", label));
            Ok(())
        }
    }

    async fn record_journal(&self, environment: &Environment, severity: Severity, content: String) {
        let event = JournalEvent::new(severity, &self.config.agent_id, content);
        if let Err(e) = self.journal.append(&environment.name, &event).await {
            warn!("Cannot append to journal of {}: {}", environment.name, e);
        }
    }

    fn warn_unknown_content_managers(&self, environment: &Environment) {
        let unknown = environment
            .application_servers
            .iter()
            .flat_map(|server| server.applications.iter())
            .flat_map(|app| app.content_managers.iter())
            .filter(|manager| manager.active && !self.content_managers.contains(&manager.classname));
        for manager in unknown {
            warn!(
                "Content manager {} of environment {} uses unknown class '{}'",
                manager.name, environment.name, manager.classname
            );
        }
    }
}

pub(crate) fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
