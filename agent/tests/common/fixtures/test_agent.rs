//! Engine harness rooted in a temporary directory
//!
//! Fleet models are written as TOML; `@ROOT@` is replaced by the directory
//! path so sources, install paths and databases stay inside the test.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use agent::config::AgentConfig;
use agent::journal::{Journal, JournalEvent};
use agent::model::{Fleet, InMemoryModelStore};
use agent::Engine;

use super::{MockController, MockMailer, TECHNOLOGY};

pub struct TestAgent {
    pub dir: TempDir,
    pub engine: Arc<Engine>,
    pub controller: Arc<MockController>,
    pub mailer: Arc<MockMailer>,
    pub store: Arc<InMemoryModelStore>,
    pub config: Arc<AgentConfig>,
}

impl TestAgent {
    pub fn new(agent_id: &str, fleet_toml: &str) -> Self {
        Self::with_config(agent_id, fleet_toml, |_| {})
    }

    pub fn with_config(
        agent_id: &str,
        fleet_toml: &str,
        configure: impl FnOnce(&mut AgentConfig),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AgentConfig::new(agent_id, dir.path());
        config.api_key = "local-key".to_string();
        configure(&mut config);
        let config = Arc::new(config);

        let store = Arc::new(InMemoryModelStore::new(parse_fleet(dir.path(), fleet_toml)));
        let controller = MockController::new();
        let mailer = MockMailer::new();

        let engine = Engine::new(config.clone(), store.clone())
            .with_controllers(controller.registry(TECHNOLOGY))
            .with_mailer(mailer.clone());
        let engine = Arc::new(engine);

        Self {
            dir,
            engine,
            controller,
            mailer,
            store,
            config,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Writes a file below the test directory, creating parents.
    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative)).unwrap()
    }

    /// Swaps the fleet model seen by subsequent runs.
    pub fn replace_fleet(&self, fleet_toml: &str) {
        self.store.replace(parse_fleet(self.root(), fleet_toml));
    }

    pub async fn journal(&self, environment: &str) -> Vec<JournalEvent> {
        Journal::new(&self.config.journal_dir)
            .load(environment)
            .await
            .unwrap()
    }
}

pub fn parse_fleet(root: &Path, fleet_toml: &str) -> Fleet {
    let toml = fleet_toml.replace("@ROOT@", &root.display().to_string());
    toml::from_str(&toml).unwrap_or_else(|e| panic!("invalid test fleet: {}\n{}", e, toml))
}
