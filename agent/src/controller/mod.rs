//! Narrow driver interface to a target application server runtime
//!
//! The engine never inspects a runtime directly. Every deployment question
//! goes through a [`Controller`] obtained from the [`ControllerRegistry`]
//! by the server's `technology`. Concrete drivers are supplied by the
//! embedding binary.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::{UpdateError, UpdateResult};
use crate::model::{
    ApplicationServer, JdbcConnectionPool, JdbcDataSource, JmsConnectionFactory, JmsServer,
    JndiBinding, SharedLibrary,
};
use crate::types::ResourceKind;

/// Declared state of one server-side resource, variables already substituted.
#[derive(Debug, Clone)]
pub enum ResourceSpec {
    JdbcConnectionPool(JdbcConnectionPool),
    JdbcDataSource(JdbcDataSource),
    JmsConnectionFactory(JmsConnectionFactory),
    JmsServer(JmsServer),
    JndiBinding(JndiBinding),
    SharedLibrary(SharedLibrary),
    Archive(ArchiveSpec),
}

#[derive(Debug, Clone)]
pub struct ArchiveSpec {
    pub name: String,
    pub application: String,
    /// Local file deployed by the controller
    pub path: PathBuf,
    pub context_root: String,
    pub virtual_host: String,
}

impl ResourceSpec {
    pub fn name(&self) -> &str {
        match self {
            ResourceSpec::JdbcConnectionPool(r) => &r.name,
            ResourceSpec::JdbcDataSource(r) => &r.name,
            ResourceSpec::JmsConnectionFactory(r) => &r.name,
            ResourceSpec::JmsServer(r) => &r.name,
            ResourceSpec::JndiBinding(r) => &r.name,
            ResourceSpec::SharedLibrary(r) => &r.name,
            ResourceSpec::Archive(r) => &r.name,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::JdbcConnectionPool(_) => ResourceKind::JdbcConnectionPool,
            ResourceSpec::JdbcDataSource(_) => ResourceKind::JdbcDataSource,
            ResourceSpec::JmsConnectionFactory(_) => ResourceKind::JmsConnectionFactory,
            ResourceSpec::JmsServer(_) => ResourceKind::JmsServer,
            ResourceSpec::JndiBinding(_) => ResourceKind::JndiBinding,
            ResourceSpec::SharedLibrary(_) => ResourceKind::SharedLibrary,
            ResourceSpec::Archive(_) => ResourceKind::Archive,
        }
    }
}

#[async_trait]
pub trait Controller: Send + Sync {
    async fn is_deployed(&self, resource: &ResourceSpec) -> UpdateResult<bool>;

    async fn deploy(&self, resource: &ResourceSpec) -> UpdateResult<()>;

    /// Compares declared and live configuration without changing anything.
    async fn is_up_to_date(&self, resource: &ResourceSpec) -> UpdateResult<bool>;

    /// Applies the declared configuration; returns whether anything changed.
    async fn update(&self, resource: &ResourceSpec) -> UpdateResult<bool>;

    async fn undeploy(&self, resource: &ResourceSpec) -> UpdateResult<()>;

    async fn shutdown(&self) -> UpdateResult<()>;

    async fn status(&self) -> UpdateResult<String>;

    async fn is_stopped(&self) -> UpdateResult<bool>;
}

pub type ControllerFactory =
    Arc<dyn Fn(&ApplicationServer) -> UpdateResult<Arc<dyn Controller>> + Send + Sync>;

#[derive(Default, Clone)]
pub struct ControllerRegistry {
    factories: HashMap<String, ControllerFactory>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, technology: impl Into<String>, factory: F)
    where
        F: Fn(&ApplicationServer) -> UpdateResult<Arc<dyn Controller>> + Send + Sync + 'static,
    {
        self.factories.insert(technology.into(), Arc::new(factory));
    }

    pub fn technologies(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.factories.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Controller for a server whose fields are already substituted.
    pub fn controller_for(&self, server: &ApplicationServer) -> UpdateResult<Arc<dyn Controller>> {
        let factory = self.factories.get(&server.technology).ok_or_else(|| {
            UpdateError::Configuration(format!(
                "no controller for technology '{}' of application server '{}'",
                server.technology, server.name
            ))
        })?;
        factory(server)
    }
}
