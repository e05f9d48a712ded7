//! Profile rights administration

use super::AppState;
use crate::rights::{ProfileId, Rights};
use crate::server::error::ApiError;
use crate::server::session::ManagerSession;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct DashboardRight {
    pub uid: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_title: Option<String>,
    pub rights: Rights,
}

#[derive(Debug, Serialize)]
pub struct ProfileRights {
    pub profile_id: ProfileId,
    pub dashboards: Vec<DashboardRight>,
}

/// Every Grafana dashboard with the profile's stored rights (0 when none)
pub async fn list(
    State(state): State<Arc<AppState>>,
    _manager: ManagerSession,
    Path(profile_id): Path<ProfileId>,
) -> Result<Json<ProfileRights>, ApiError> {
    let dashboards = state.grafana.dashboards(None).await?;
    let stored = state.rights.lock().rights_for_profile(profile_id)?;

    let dashboards = dashboards
        .into_iter()
        .map(|d| DashboardRight {
            rights: stored.get(&d.uid).copied().unwrap_or(Rights::NONE),
            uid: d.uid,
            title: d.title,
            folder_title: d.folder_title,
        })
        .collect();

    Ok(Json(ProfileRights {
        profile_id,
        dashboards,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RightsUpdate {
    pub dashboards: HashMap<String, Rights>,
}

#[derive(Debug, Serialize)]
pub struct RightsUpdated {
    pub rights: usize,
}

/// Upsert the submitted per-dashboard rights
pub async fn update(
    State(state): State<Arc<AppState>>,
    ManagerSession(session): ManagerSession,
    Path(profile_id): Path<ProfileId>,
    Json(update): Json<RightsUpdate>,
) -> Result<Json<RightsUpdated>, ApiError> {
    let count = state.rights.lock().set_rights(
        profile_id,
        update
            .dashboards
            .iter()
            .map(|(uid, rights)| (uid.as_str(), *rights)),
    )?;

    info!(
        "User {} updated {} rights of profile {}",
        session.user_id, count, profile_id
    );
    Ok(Json(RightsUpdated { rights: count }))
}

#[derive(Debug, Deserialize)]
pub struct SetAllRequest {
    /// Grant read on everything when true, revoke everything when false
    pub allow: bool,
}

/// Grant or revoke every dashboard currently listed by Grafana
pub async fn set_all(
    State(state): State<Arc<AppState>>,
    ManagerSession(session): ManagerSession,
    Path(profile_id): Path<ProfileId>,
    Json(request): Json<SetAllRequest>,
) -> Result<Json<RightsUpdated>, ApiError> {
    let dashboards = state.grafana.dashboards(None).await?;
    let rights = if request.allow { Rights::READ } else { Rights::NONE };

    let count = state.rights.lock().set_rights_for_all(
        profile_id,
        dashboards.iter().map(|d| d.uid.as_str()),
        rights,
    )?;

    info!(
        "User {} set rights {} on all {} dashboards for profile {}",
        session.user_id, rights.0, count, profile_id
    );
    Ok(Json(RightsUpdated { rights: count }))
}
