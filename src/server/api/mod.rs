//! HTTP API Endpoints
//!
//! Routes:
//! - GET /public/jwks - JWKS document for Grafana (no session)
//! - GET|POST /api/token - fresh embed token
//! - GET /api/dashboards/tree - folder tree filtered by profile
//! - GET /api/dashboards/embed?uuid= - iframe URL for one dashboard
//! - GET|PUT /api/profiles/{id}/rights - per-dashboard rights of a profile
//! - POST /api/profiles/{id}/rights/all - grant or revoke every dashboard
//! - GET|PUT /api/config, GET /api/config/status - Grafana settings
//! - GET /api/health, /api/healthz, /api/readyz - probes

pub mod dashboards;
pub mod health;
pub mod rights;
pub mod settings;
pub mod token;

use super::error::ApiError;
use crate::grafana::GrafanaApi;
use crate::rights::{AccessRights, ProfileId, RightsStore};
use crate::settings::{GrafanaSettings, SettingsStore};
use crate::token::TokenIssuer;
use axum::{
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub version: &'static str,
    pub issuer: Arc<TokenIssuer>,
    pub grafana: Arc<dyn GrafanaApi>,
    pub rights: Arc<Mutex<RightsStore>>,
    pub settings: Arc<Mutex<SettingsStore>>,
    /// URL to configure as Grafana's `jwk_set_url`
    pub jwks_url: String,
}

impl AppState {
    pub fn new(
        issuer: TokenIssuer,
        grafana: Arc<dyn GrafanaApi>,
        rights: Arc<Mutex<RightsStore>>,
        settings: Arc<Mutex<SettingsStore>>,
        jwks_url: impl Into<String>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
            issuer: Arc::new(issuer),
            grafana,
            rights,
            settings,
            jwks_url: jwks_url.into(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Current Grafana settings from the store
    pub fn grafana_settings(&self) -> Result<GrafanaSettings, ApiError> {
        Ok(GrafanaSettings::load(&self.settings.lock())?)
    }

    /// Reject profiles without read access to any dashboard
    pub fn ensure_can_view_any(&self, profile: ProfileId) -> Result<(), ApiError> {
        if self.rights.lock().can_view_any(profile)? {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "Profile cannot view any Grafana dashboard".to_string(),
            ))
        }
    }
}

/// Build every route over the shared state
pub fn routes(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(health::health_check))
        .route("/healthz", get(health::liveness))
        .route("/readyz", get(health::readiness))
        .route("/token", get(token::issue).post(token::issue))
        .route("/dashboards/tree", get(dashboards::tree))
        .route("/dashboards/embed", get(dashboards::embed))
        .route(
            "/profiles/{id}/rights",
            get(rights::list).put(rights::update),
        )
        .route("/profiles/{id}/rights/all", post(rights::set_all))
        .route("/config", get(settings::show).put(settings::update))
        .route("/config/status", get(settings::status));

    Router::new()
        .route("/public/jwks", get(token::jwks))
        .nest("/api", api)
        .with_state(state)
}
