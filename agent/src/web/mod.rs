// File: agent/src/web/mod.rs
pub mod handlers;
pub mod middleware;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::updater::Engine;

/// Application state shared across all handlers
pub struct AppState {
    pub engine: Arc<Engine>,
    pub api_key: String,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        let api_key = engine.config().api_key.clone();
        Self { engine, api_key }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/update/{kind}", post(handlers::update_resource))
        .route("/check/{kind}", post(handlers::check_resource))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_web_server(engine: Arc<Engine>) -> Result<()> {
    let addr = engine.config().bind_address();
    let app = create_router(Arc::new(AppState::new(engine)));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Agent listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
