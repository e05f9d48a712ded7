//! Grafana settings administration

use super::AppState;
use crate::server::error::ApiError;
use crate::server::session::ManagerSession;
use crate::settings::{GrafanaSettings, SettingsUpdate};
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Settings as shown to administrators; the password is never echoed
#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub url: String,
    pub username: String,
    pub password_set: bool,
    pub lightmode: bool,
    pub timeout_secs: u64,
    pub jwks_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl SettingsView {
    fn new(settings: &GrafanaSettings, jwks_url: &str) -> Self {
        Self {
            url: settings.url.clone(),
            username: settings.username.clone(),
            password_set: !settings.password.is_empty(),
            lightmode: settings.lightmode,
            timeout_secs: settings.timeout_secs,
            jwks_url: jwks_url.to_string(),
            warning: None,
        }
    }
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    _manager: ManagerSession,
) -> Result<Json<SettingsView>, ApiError> {
    let settings = state.grafana_settings()?;
    Ok(Json(SettingsView::new(&settings, &state.jwks_url)))
}

/// Save settings, then push the theme to the service account
pub async fn update(
    State(state): State<Arc<AppState>>,
    ManagerSession(session): ManagerSession,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsView>, ApiError> {
    if let Some(url) = update.url.as_deref().filter(|u| !u.is_empty()) {
        validate_url(url)?;
    }

    let settings = {
        let mut store = state.settings.lock();
        let mut settings = GrafanaSettings::load(&store)?;
        settings.apply_update(update);
        settings.save(&mut store)?;
        settings
    };
    info!("User {} updated Grafana settings", session.user_id);

    let mut view = SettingsView::new(&settings, &state.jwks_url);
    if settings.is_valid() {
        if let Err(e) = state.grafana.set_theme(settings.theme()).await {
            warn!("Could not apply Grafana theme: {}", e);
            view.warning = Some(format!("Settings saved, but the theme was not applied: {}", e));
        }
    }

    Ok(Json(view))
}

fn validate_url(url: &str) -> Result<(), ApiError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| ApiError::BadRequest(format!("Invalid Grafana URL '{}': {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ApiError::BadRequest(format!(
            "Unsupported Grafana URL scheme '{}'",
            other
        ))),
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub configured: bool,
    pub api_login: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Check that the configured account can log into the Grafana API
pub async fn status(
    State(state): State<Arc<AppState>>,
    _manager: ManagerSession,
) -> Result<Json<StatusResponse>, ApiError> {
    let configured = state.grafana_settings()?.is_valid();

    let (api_login, message) = match state.grafana.check_login().await {
        Ok(ok) => (ok, None),
        Err(e) => (false, Some(e.to_string())),
    };

    Ok(Json(StatusResponse {
        configured,
        api_login,
        message,
    }))
}
