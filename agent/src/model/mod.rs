//! Declarative fleet model
//!
//! The model is read-only to the engine: every run loads a fresh copy from
//! the [`ModelStore`] and walks it. Element names are unique among siblings,
//! which [`Fleet::validate`] enforces at load time.

pub mod store;
pub mod variables;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::{UpdateError, UpdateResult};

pub use store::{FleetStore, InMemoryModelStore, ModelStore};

fn enabled() -> bool {
    true
}

fn default_agent_port() -> u16 {
    crate::constants::defaults::PORT
}

/// Shape shared by every element of the resource tree.
pub trait Node: Sync {
    fn name(&self) -> &str;
    fn active(&self) -> bool;
    fn blocker(&self) -> bool;
    /// Owning agent id. Empty on a server or software means the local agent;
    /// deeper down it means the agent owning the parent.
    fn agent(&self) -> &str;
}

macro_rules! impl_node {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Node for $ty {
                fn name(&self) -> &str {
                    &self.name
                }
                fn active(&self) -> bool {
                    self.active
                }
                fn blocker(&self) -> bool {
                    self.blocker
                }
                fn agent(&self) -> &str {
                    &self.agent
                }
            }
        )+
    };
}

/// Root of the declarative model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fleet {
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
    #[serde(default)]
    pub environments: Vec<Environment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    pub hostname: String,
    #[serde(default = "default_agent_port")]
    pub port: u16,
    /// 6-field cron expression driving scheduled environment updates
    pub cron: Option<String>,
    /// Maximum number of running application servers on the host, 0 = unlimited
    #[serde(default)]
    pub max_running_servers: usize,
    pub api_key: Option<String>,
}

impl AgentEntry {
    pub fn base_url(&self) -> String {
        if self.hostname.starts_with("http://") || self.hostname.starts_with("https://") {
            format!("{}:{}", self.hostname.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.hostname, self.port)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub auto_update: bool,
    /// User holding the console edit lock, empty when unlocked
    #[serde(default)]
    pub lock: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub application_servers: Vec<ApplicationServer>,
    #[serde(default)]
    pub software: Vec<Software>,
    #[serde(default)]
    pub notifiers: Notifiers,
    #[serde(default)]
    pub publishers: Publishers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notifiers {
    #[serde(default)]
    pub countdown_minutes: u64,
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Publishers {
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationServer {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    /// Key of the controller factory (e.g. "jboss", "weblogic")
    #[serde(default)]
    pub technology: String,
    #[serde(default)]
    pub jmx_url: String,
    #[serde(default)]
    pub admin_user: String,
    #[serde(default)]
    pub admin_password: String,
    #[serde(default)]
    pub update_requires_restart: bool,
    #[serde(default)]
    pub cache_clean_requires_restart: bool,
    #[serde(default)]
    pub use_jmx_stop: bool,
    #[serde(default)]
    pub startup_command: String,
    #[serde(default)]
    pub shutdown_command: String,
    #[serde(default)]
    pub jdbc_connection_pools: Vec<JdbcConnectionPool>,
    #[serde(default)]
    pub jdbc_data_sources: Vec<JdbcDataSource>,
    #[serde(default)]
    pub jms_connection_factories: Vec<JmsConnectionFactory>,
    #[serde(default)]
    pub jms_servers: Vec<JmsServer>,
    #[serde(default)]
    pub jndi_bindings: Vec<JndiBinding>,
    #[serde(default)]
    pub shared_libraries: Vec<SharedLibrary>,
    #[serde(default)]
    pub applications: Vec<Application>,
    /// Directories (glob patterns allowed) purged on cache cleaning
    #[serde(default)]
    pub cache_dirs: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JdbcConnectionPool {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub increment: u32,
    #[serde(default)]
    pub initial: u32,
    #[serde(default)]
    pub maximal: u32,
    #[serde(default)]
    pub classpath: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JdbcDataSource {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    /// Name of the connection pool backing the data source
    pub pool: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JmsConnectionFactory {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JmsServer {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub queues: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JndiBinding {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub jndi_name: String,
    #[serde(default)]
    pub jndi_alias: String,
    #[serde(default)]
    pub provider_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedLibrary {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub classpath: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    /// Artifact against which relative resource URIs are resolved
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub configuration_files: Vec<ConfigurationFile>,
    #[serde(default)]
    pub databases: Vec<Database>,
    #[serde(default)]
    pub content_managers: Vec<ContentManager>,
    #[serde(default)]
    pub archives: Vec<Archive>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Archive {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    pub uri: String,
    /// Installation path; the cache copy is deployed when empty
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub context_root: String,
    #[serde(default)]
    pub virtual_host: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigurationFile {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    pub uri: String,
    pub path: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    /// sqlx connection URL
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Server connection pool lending its URL and credentials
    #[serde(default)]
    pub connection_pool: String,
    /// External SQL client; `${script}` is replaced by the script path
    #[serde(default)]
    pub sql_command: String,
    #[serde(default)]
    pub sql_scripts: Vec<SqlScript>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlScript {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    pub uri: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentManager {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    /// Registered content manager class name
    pub classname: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Software {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub update_plan: Vec<UpdatePlanItem>,
}

/// One step of a software update plan; order is significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdatePlanItem {
    Command(Command),
    Location(Location),
    ConfigurationFile(ConfigurationFile),
    Database(Database),
}

impl UpdatePlanItem {
    pub fn node(&self) -> &dyn Node {
        match self {
            UpdatePlanItem::Command(item) => item,
            UpdatePlanItem::Location(item) => item,
            UpdatePlanItem::ConfigurationFile(item) => item,
            UpdatePlanItem::Database(item) => item,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            UpdatePlanItem::Command(_) => "command",
            UpdatePlanItem::Location(_) => "location",
            UpdatePlanItem::ConfigurationFile(_) => "configuration file",
            UpdatePlanItem::Database(_) => "database",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    pub command: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub blocker: bool,
    #[serde(default)]
    pub agent: String,
    pub uri: String,
    pub path: String,
    #[serde(default)]
    pub force: bool,
}

impl_node!(
    ApplicationServer,
    JdbcConnectionPool,
    JdbcDataSource,
    JmsConnectionFactory,
    JmsServer,
    JndiBinding,
    SharedLibrary,
    Application,
    Archive,
    ConfigurationFile,
    Database,
    SqlScript,
    ContentManager,
    Software,
    Command,
    Location,
);

/// Owning agent of a node: its own, or the one inherited from its parent.
pub fn effective_agent<'a>(node: &'a dyn Node, inherited: &'a str) -> &'a str {
    if node.agent().is_empty() {
        inherited
    } else {
        node.agent()
    }
}

/// Looks a named element up among its siblings.
pub fn find<'a, T: Node>(items: &'a [T], what: &'static str, name: &str) -> UpdateResult<&'a T> {
    items
        .iter()
        .find(|item| item.name() == name)
        .ok_or_else(|| UpdateError::not_found(what, name))
}

impl Fleet {
    pub fn environment(&self, name: &str) -> UpdateResult<&Environment> {
        self.environments
            .iter()
            .find(|env| env.name == name)
            .ok_or_else(|| UpdateError::not_found("environment", name))
    }

    pub fn agent(&self, id: &str) -> UpdateResult<&AgentEntry> {
        self.agents
            .iter()
            .find(|agent| agent.id == id)
            .ok_or_else(|| UpdateError::not_found("agent", id))
    }

    /// Checks sibling name uniqueness across the whole tree.
    pub fn validate(&self) -> UpdateResult<()> {
        unique("agent", "fleet", self.agents.iter().map(|a| a.id.as_str()))?;
        unique(
            "environment",
            "fleet",
            self.environments.iter().map(|e| e.name.as_str()),
        )?;

        for env in &self.environments {
            let scope = format!("environment '{}'", env.name);
            unique("application server", &scope, names(&env.application_servers))?;
            unique("software", &scope, names(&env.software))?;

            for server in &env.application_servers {
                let scope = format!("application server '{}'", server.name);
                unique("JDBC connection pool", &scope, names(&server.jdbc_connection_pools))?;
                unique("JDBC data source", &scope, names(&server.jdbc_data_sources))?;
                unique(
                    "JMS connection factory",
                    &scope,
                    names(&server.jms_connection_factories),
                )?;
                unique("JMS server", &scope, names(&server.jms_servers))?;
                unique("JNDI binding", &scope, names(&server.jndi_bindings))?;
                unique("shared library", &scope, names(&server.shared_libraries))?;
                unique("application", &scope, names(&server.applications))?;

                for app in &server.applications {
                    let scope = format!("application '{}'", app.name);
                    unique("configuration file", &scope, names(&app.configuration_files))?;
                    unique("database", &scope, names(&app.databases))?;
                    unique("content manager", &scope, names(&app.content_managers))?;
                    unique("archive", &scope, names(&app.archives))?;
                    for db in &app.databases {
                        unique(
                            "SQL script",
                            &format!("database '{}'", db.name),
                            names(&db.sql_scripts),
                        )?;
                    }
                }
            }

            for software in &env.software {
                unique(
                    "update plan item",
                    &format!("software '{}'", software.name),
                    software.update_plan.iter().map(|item| item.node().name()),
                )?;
            }
        }

        Ok(())
    }
}

fn names<T: Node>(items: &[T]) -> impl Iterator<Item = &str> {
    items.iter().map(|item| item.name())
}

fn unique<'a>(
    what: &str,
    scope: &str,
    names: impl Iterator<Item = &'a str>,
) -> UpdateResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(UpdateError::Configuration(format!(
                "duplicate {} '{}' in {}",
                what, name, scope
            )));
        }
    }
    Ok(())
}

impl Environment {
    pub fn application_server(&self, name: &str) -> UpdateResult<&ApplicationServer> {
        find(&self.application_servers, "application server", name)
    }

    pub fn software(&self, name: &str) -> UpdateResult<&Software> {
        find(&self.software, "software", name)
    }

    /// Replaces every `${name}` reference with the environment variable value.
    pub fn substitute(&self, value: &str) -> String {
        variables::substitute(value, &self.variables)
    }

    /// The environment with its own variables applied to every element.
    pub fn resolved(&self) -> UpdateResult<Environment> {
        variables::resolve(self, &self.variables)
    }
}

impl ApplicationServer {
    pub fn application(&self, name: &str) -> UpdateResult<&Application> {
        find(&self.applications, "application", name)
    }

    pub fn jdbc_connection_pool(&self, name: &str) -> UpdateResult<&JdbcConnectionPool> {
        find(&self.jdbc_connection_pools, "JDBC connection pool", name)
    }
}

impl Database {
    pub fn sql_script(&self, name: &str) -> UpdateResult<&SqlScript> {
        find(&self.sql_scripts, "SQL script", name)
    }
}

impl Software {
    pub fn item(&self, name: &str) -> UpdateResult<&UpdatePlanItem> {
        self.update_plan
            .iter()
            .find(|item| item.node().name() == name)
            .ok_or_else(|| UpdateError::not_found("update plan item", name))
    }
}
