// File: agent/src/main.rs
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent::config::ConfigManager;
use agent::model::{FleetStore, ModelStore};
use agent::scheduler::UpdateScheduler;
use agent::web::start_web_server;
use agent::Engine;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("agent=info".parse()?)
        .add_directive("jeefleet_agent=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("tokio_cron_scheduler=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting JEE fleet agent");

    let config_manager = ConfigManager::new("config".to_string()).await?;
    let config = config_manager.get_current_config();

    let store: Arc<dyn ModelStore> = Arc::new(FleetStore::new(config.model_location.clone()));
    let fleet = store.load().await?;
    info!(
        "Fleet model loaded: {} agents, {} environments",
        fleet.agents.len(),
        fleet.environments.len()
    );

    let engine = Arc::new(Engine::new(config.clone(), store));

    let scheduler = UpdateScheduler::new(engine.clone()).await?;
    if let Err(e) = scheduler.start().await {
        error!("Update scheduler not started: {}", e);
    }

    let server_engine = engine.clone();
    let server = tokio::spawn(async move { start_web_server(server_engine).await });

    tokio::select! {
        result = server => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, interrupting pending countdowns");
            engine.interrupt_countdowns();
        }
    }

    Ok(())
}
