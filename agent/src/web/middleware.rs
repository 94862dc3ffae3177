//! Request authentication for the RPC server

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use std::sync::Arc;
use tracing::debug;

use super::AppState;

/// Extractor accepting only requests carrying `Authorization: Bearer <key>`
/// with this agent's API key. Handlers take it as their first argument.
pub struct ApiKeyAuth;

impl FromRequestParts<Arc<AppState>> for ApiKeyAuth {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "));

        match token {
            Some(token) if token == state.api_key => Ok(ApiKeyAuth),
            Some(_) => {
                debug!("Rejected request to {} with a wrong API key", parts.uri.path());
                Err(StatusCode::UNAUTHORIZED)
            }
            None => Err(StatusCode::UNAUTHORIZED),
        }
    }
}
