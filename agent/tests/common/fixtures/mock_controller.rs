//! In-memory controller standing in for an application server runtime
//!
//! Deployed resources are remembered by name together with a fingerprint of
//! their declared configuration, so `update` reports a change only when the
//! declaration differs from what was deployed.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use agent::controller::{Controller, ControllerRegistry, ResourceSpec};
use agent::errors::{UpdateError, UpdateResult};

#[derive(Default)]
pub struct MockController {
    deployed: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    stopped: AtomicBool,
    rewrite_archives: AtomicBool,
}

fn fingerprint(spec: &ResourceSpec) -> String {
    format!("{:?}", spec)
}

impl MockController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registry serving this controller for `technology`.
    pub fn registry(self: &Arc<Self>, technology: &str) -> ControllerRegistry {
        let controller = self.clone();
        let mut registry = ControllerRegistry::new();
        registry.register(technology, move |_server| {
            Ok(controller.clone() as Arc<dyn Controller>)
        });
        registry
    }

    /// Every operation on `name` fails from now on.
    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// Status reported for every server using this controller.
    pub fn set_stopped(&self, stopped: bool) {
        self.stopped.store(stopped, Ordering::SeqCst);
    }

    /// Simulates runtimes that rewrite deployed archives (exploding,
    /// signing, descriptor patching).
    pub fn rewrite_archives_on_deploy(&self) {
        self.rewrite_archives.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that changed the runtime.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| {
                ["deploy:", "update:", "undeploy:", "shutdown"]
                    .iter()
                    .any(|prefix| call.starts_with(prefix))
            })
            .collect()
    }

    pub fn deployed(&self, name: &str) -> Option<String> {
        self.deployed.lock().unwrap().get(name).cloned()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_failure(&self, spec: &ResourceSpec) -> UpdateResult<()> {
        if self.failing.lock().unwrap().contains(spec.name()) {
            return Err(UpdateError::controller(spec.name(), "runtime refused the operation"));
        }
        Ok(())
    }
}

#[async_trait]
impl Controller for MockController {
    async fn is_deployed(&self, resource: &ResourceSpec) -> UpdateResult<bool> {
        self.check_failure(resource)?;
        Ok(self.deployed.lock().unwrap().contains_key(resource.name()))
    }

    async fn deploy(&self, resource: &ResourceSpec) -> UpdateResult<()> {
        self.check_failure(resource)?;
        self.record(format!("deploy:{}", resource.name()));
        self.deployed
            .lock()
            .unwrap()
            .insert(resource.name().to_string(), fingerprint(resource));

        if let ResourceSpec::Archive(archive) = resource {
            if self.rewrite_archives.load(Ordering::SeqCst) {
                let mut content = std::fs::read(&archive.path).unwrap_or_default();
                content.extend_from_slice(b"\n<!-- patched by runtime -->");
                std::fs::write(&archive.path, content)
                    .map_err(|e| UpdateError::controller(&archive.name, e))?;
            }
        }
        Ok(())
    }

    async fn is_up_to_date(&self, resource: &ResourceSpec) -> UpdateResult<bool> {
        self.check_failure(resource)?;
        Ok(self.deployed(resource.name()).as_deref() == Some(fingerprint(resource).as_str()))
    }

    async fn update(&self, resource: &ResourceSpec) -> UpdateResult<bool> {
        self.check_failure(resource)?;
        let declared = fingerprint(resource);
        let mut deployed = self.deployed.lock().unwrap();
        if deployed.get(resource.name()) == Some(&declared) {
            drop(deployed);
            self.record(format!("noop:{}", resource.name()));
            return Ok(false);
        }
        deployed.insert(resource.name().to_string(), declared);
        drop(deployed);
        self.record(format!("update:{}", resource.name()));
        Ok(true)
    }

    async fn undeploy(&self, resource: &ResourceSpec) -> UpdateResult<()> {
        self.check_failure(resource)?;
        self.record(format!("undeploy:{}", resource.name()));
        self.deployed.lock().unwrap().remove(resource.name());
        Ok(())
    }

    async fn shutdown(&self) -> UpdateResult<()> {
        self.record("shutdown".to_string());
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn status(&self) -> UpdateResult<String> {
        Ok(if self.stopped.load(Ordering::SeqCst) {
            "stopped".to_string()
        } else {
            "running".to_string()
        })
    }

    async fn is_stopped(&self) -> UpdateResult<bool> {
        Ok(self.stopped.load(Ordering::SeqCst))
    }
}
