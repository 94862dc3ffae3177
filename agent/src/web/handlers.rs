//! HTTP request handlers for the agent RPC
//!
//! Failures are reported in the response envelope with status 200 so the
//! calling agent can read the error category; only authentication failures
//! use HTTP status codes.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::Json as ResponseJson,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::middleware::ApiKeyAuth;
use super::AppState;
use crate::types::{ApiResponse, HealthResponse, ResourceKind, ResourceRequest, UpdateOutcome};

pub async fn update_resource(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Json(request): Json<ResourceRequest>,
) -> Result<ResponseJson<ApiResponse<UpdateOutcome>>, StatusCode> {
    let kind = match kind.parse::<ResourceKind>() {
        Ok(kind) => kind,
        Err(e) => return Ok(ResponseJson(ApiResponse::failure(&e))),
    };
    debug!(
        "Update request for {} in {} (delegated: {})",
        kind, request.environment, request.delegation
    );

    match state.engine.update(kind, request).await {
        Ok(outcome) => Ok(ResponseJson(ApiResponse::success(outcome))),
        Err(e) => {
            warn!("Update of {} failed: {}", kind, e);
            Ok(ResponseJson(ApiResponse::failure(&e)))
        }
    }
}

pub async fn check_resource(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Json(request): Json<ResourceRequest>,
) -> Result<ResponseJson<ApiResponse<bool>>, StatusCode> {
    let kind = match kind.parse::<ResourceKind>() {
        Ok(kind) => kind,
        Err(e) => return Ok(ResponseJson(ApiResponse::failure(&e))),
    };

    match state.engine.check(kind, request).await {
        Ok(up_to_date) => Ok(ResponseJson(ApiResponse::success(up_to_date))),
        Err(e) => Ok(ResponseJson(ApiResponse::failure(&e))),
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> ResponseJson<HealthResponse> {
    ResponseJson(HealthResponse {
        agent_id: state.engine.agent_id().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}
