//! Application content managers
//!
//! A content manager is a plugin run as part of an application update
//! (loading reference data, warming a search index...). Applications declare
//! it by class name plus properties; the registry maps class names to
//! constructors.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{UpdateError, UpdateResult};
use crate::model::Property;
use crate::services::commands::execute_shell_command;

/// Where a content manager runs.
#[derive(Debug, Clone)]
pub struct ContentScope {
    pub environment: String,
    pub server: String,
    pub application: String,
}

#[async_trait]
pub trait ContentManager: Send + Sync {
    async fn run(&self, scope: &ContentScope) -> UpdateResult<()>;
}

pub type ContentManagerFactory =
    Arc<dyn Fn(&[Property]) -> UpdateResult<Box<dyn ContentManager>> + Send + Sync>;

pub const SHELL: &str = "shell";

#[derive(Clone)]
pub struct ContentManagerRegistry {
    factories: HashMap<String, ContentManagerFactory>,
}

impl Default for ContentManagerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ContentManagerRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(SHELL, |properties| {
            ShellContentManager::from_properties(properties)
                .map(|m| Box::new(m) as Box<dyn ContentManager>)
        });
        registry
    }

    pub fn register<F>(&mut self, classname: impl Into<String>, factory: F)
    where
        F: Fn(&[Property]) -> UpdateResult<Box<dyn ContentManager>> + Send + Sync + 'static,
    {
        self.factories.insert(classname.into(), Arc::new(factory));
    }

    pub fn contains(&self, classname: &str) -> bool {
        self.factories.contains_key(classname)
    }

    pub fn create(
        &self,
        classname: &str,
        properties: &[Property],
    ) -> UpdateResult<Box<dyn ContentManager>> {
        let factory = self.factories.get(classname).ok_or_else(|| {
            UpdateError::Configuration(format!("unknown content manager class '{}'", classname))
        })?;
        factory(properties)
    }
}

/// Runs the `command` property through `sh -c`.
pub struct ShellContentManager {
    command: String,
}

impl ShellContentManager {
    pub fn from_properties(properties: &[Property]) -> UpdateResult<Self> {
        let command = properties
            .iter()
            .find(|p| p.name == "command")
            .map(|p| p.value.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                UpdateError::Configuration(
                    "shell content manager requires a 'command' property".to_string(),
                )
            })?;
        Ok(Self { command })
    }
}

#[async_trait]
impl ContentManager for ShellContentManager {
    async fn run(&self, scope: &ContentScope) -> UpdateResult<()> {
        execute_shell_command(&self.command)
            .await
            .map(|_| ())
            .map_err(|e| {
                UpdateError::controller(format!("content manager of {}", scope.application), e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ContentScope {
        ContentScope {
            environment: "prod".into(),
            server: "as1".into(),
            application: "shop".into(),
        }
    }

    #[tokio::test]
    async fn shell_manager_runs_command() {
        let registry = ContentManagerRegistry::with_builtins();
        let manager = registry
            .create(
                SHELL,
                &[Property {
                    name: "command".into(),
                    value: "true".into(),
                }],
            )
            .unwrap();
        manager.run(&scope()).await.unwrap();
    }

    #[test]
    fn unknown_class_and_missing_property_are_configuration_errors() {
        let registry = ContentManagerRegistry::with_builtins();
        assert!(matches!(
            registry.create("com.acme.Loader", &[]).err().unwrap(),
            UpdateError::Configuration(_)
        ));
        assert!(matches!(
            registry.create(SHELL, &[]).err().unwrap(),
            UpdateError::Configuration(_)
        ));
    }
}
