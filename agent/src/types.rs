// File: agent/src/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{ErrorCategory, UpdateError};
use crate::update_log::UpdateMessage;

// === RESOURCE KINDS ===

/// Node kinds addressable over RPC; the path segment of `/update/{kind}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Environment,
    ApplicationServer,
    Application,
    JdbcConnectionPool,
    JdbcDataSource,
    JmsConnectionFactory,
    JmsServer,
    JndiBinding,
    SharedLibrary,
    Archive,
    ConfigurationFile,
    Database,
    SqlScript,
    ContentManager,
    Software,
    Command,
    Location,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 17] = [
        ResourceKind::Environment,
        ResourceKind::ApplicationServer,
        ResourceKind::Application,
        ResourceKind::JdbcConnectionPool,
        ResourceKind::JdbcDataSource,
        ResourceKind::JmsConnectionFactory,
        ResourceKind::JmsServer,
        ResourceKind::JndiBinding,
        ResourceKind::SharedLibrary,
        ResourceKind::Archive,
        ResourceKind::ConfigurationFile,
        ResourceKind::Database,
        ResourceKind::SqlScript,
        ResourceKind::ContentManager,
        ResourceKind::Software,
        ResourceKind::Command,
        ResourceKind::Location,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Environment => "environment",
            ResourceKind::ApplicationServer => "application-server",
            ResourceKind::Application => "application",
            ResourceKind::JdbcConnectionPool => "jdbc-connection-pool",
            ResourceKind::JdbcDataSource => "jdbc-data-source",
            ResourceKind::JmsConnectionFactory => "jms-connection-factory",
            ResourceKind::JmsServer => "jms-server",
            ResourceKind::JndiBinding => "jndi-binding",
            ResourceKind::SharedLibrary => "shared-library",
            ResourceKind::Archive => "archive",
            ResourceKind::ConfigurationFile => "configuration-file",
            ResourceKind::Database => "database",
            ResourceKind::SqlScript => "sql-script",
            ResourceKind::ContentManager => "content-manager",
            ResourceKind::Software => "software",
            ResourceKind::Command => "command",
            ResourceKind::Location => "location",
        }
    }

    /// Human label used in log messages ("JDBC connection pool P1 ...").
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Environment => "environment",
            ResourceKind::ApplicationServer => "application server",
            ResourceKind::Application => "application",
            ResourceKind::JdbcConnectionPool => "JDBC connection pool",
            ResourceKind::JdbcDataSource => "JDBC data source",
            ResourceKind::JmsConnectionFactory => "JMS connection factory",
            ResourceKind::JmsServer => "JMS server",
            ResourceKind::JndiBinding => "JNDI binding",
            ResourceKind::SharedLibrary => "shared library",
            ResourceKind::Archive => "archive",
            ResourceKind::ConfigurationFile => "configuration file",
            ResourceKind::Database => "database",
            ResourceKind::SqlScript => "SQL script",
            ResourceKind::ContentManager => "content manager",
            ResourceKind::Software => "software",
            ResourceKind::Command => "command",
            ResourceKind::Location => "location",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UpdateError::not_found("resource kind", s))
    }
}

// === REQUEST STRUCTURES ===

/// Addresses one node of the model. Which optional fields are required
/// depends on the [`ResourceKind`]: server-level resources need `server`,
/// application resources need `server` and `application`, SQL scripts also
/// `database`, software plan items need `software`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub environment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Forwarded by another agent rather than issued by a client
    #[serde(default)]
    pub delegation: bool,
    /// Agents that already forwarded this exact request
    #[serde(default)]
    pub via: Vec<String>,
    /// Number of nested delegations leading to this request
    #[serde(default)]
    pub depth: u32,
}

impl ResourceRequest {
    pub fn environment(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            ..Default::default()
        }
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }

    pub fn software(mut self, software: impl Into<String>) -> Self {
        self.software = Some(software.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// True when both requests address the same node.
    pub fn same_target(&self, other: &ResourceRequest) -> bool {
        self.environment == other.environment
            && self.server == other.server
            && self.application == other.application
            && self.software == other.software
            && self.database == other.database
            && self.name == other.name
    }
}

// === RESPONSE STRUCTURES ===

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub updated: bool,
    #[serde(default)]
    pub messages: Vec<UpdateMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorCategory>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            error_kind: None,
        }
    }

    pub fn failure(err: &UpdateError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.category()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub agent_id: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
