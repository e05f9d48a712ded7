//! Health Check API

use super::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// Timestamp (ISO 8601)
    pub timestamp: String,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version,
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Liveness probe
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: the signing key pair must be loadable
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.issuer.jwks() {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            warn!("Not ready: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
