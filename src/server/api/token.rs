//! Token and JWKS endpoints

use super::AppState;
use crate::server::error::ApiError;
use crate::server::session::HostSession;
use crate::token::{JwkSet, REFRESH_INTERVAL_SECS};
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: i64,
    pub refresh_interval_secs: u64,
}

/// Public key set Grafana verifies embed tokens against
pub async fn jwks(State(state): State<Arc<AppState>>) -> Result<Json<JwkSet>, ApiError> {
    Ok(Json(state.issuer.jwks()?))
}

/// Fresh token for the embedded iframe; also the refresh call
pub async fn issue(
    State(state): State<Arc<AppState>>,
    session: HostSession,
) -> Result<Json<TokenResponse>, ApiError> {
    state.ensure_can_view_any(session.profile_id)?;

    let settings = state.grafana_settings()?;
    let token = state.issuer.refresh(&settings.username)?;

    Ok(Json(TokenResponse {
        expires_at: token.claims().exp,
        token: token.into_string(),
        refresh_interval_secs: REFRESH_INTERVAL_SECS,
    }))
}
