//! Dashboard listing and embed view

use super::AppState;
use crate::embed::{embed_url, EmbedView};
use crate::grafana::GrafanaError;
use crate::rights::AccessRights;
use crate::server::error::ApiError;
use crate::server::session::HostSession;
use crate::tree::{visible_dashboards, FolderTree, TreeNode};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeStatus {
    Ok,
    /// Grafana answered but nothing is visible to the profile
    Empty,
    /// Grafana could not be queried
    FetchFailed,
}

#[derive(Debug, Serialize)]
pub struct TreeResponse {
    pub tree: Vec<TreeNode>,
    pub status: TreeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TreeResponse {
    fn failed(err: GrafanaError) -> Self {
        Self {
            tree: Vec::new(),
            status: TreeStatus::FetchFailed,
            message: Some(err.to_string()),
        }
    }
}

/// Folder tree of the dashboards the session's profile can read
pub async fn tree(
    State(state): State<Arc<AppState>>,
    session: HostSession,
) -> Result<Json<TreeResponse>, ApiError> {
    let (folders, dashboards) =
        tokio::join!(state.grafana.folders(), state.grafana.dashboards(None));

    let (folders, dashboards) = match (folders, dashboards) {
        (Ok(folders), Ok(dashboards)) => (folders, dashboards),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Dashboard listing failed: {}", e);
            return Ok(Json(TreeResponse::failed(e)));
        }
    };

    let tree = FolderTree::build_for_profile(
        folders,
        dashboards,
        &*state.rights.lock(),
        session.profile_id,
    )?;

    let status = if tree.is_empty() {
        TreeStatus::Empty
    } else {
        TreeStatus::Ok
    };
    debug!(
        "Tree for profile {}: {} dashboards",
        session.profile_id,
        tree.dashboard_count()
    );

    if tree.dashboard_count() == 0 {
        return Ok(Json(TreeResponse {
            tree: tree.to_nodes(),
            status,
            message: None,
        }));
    }

    // Leaves stay listed without a link when no token can be signed
    let settings = state.grafana_settings()?;
    let token = match state.issuer.issue(&settings.username) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!("Tree listed without embed links: {}", e);
            None
        }
    };

    let nodes = tree.to_nodes_with(&|dashboard| {
        token
            .as_ref()
            .map(|token| embed_url(&settings.url, &dashboard.url, token.as_str()))
    });

    Ok(Json(TreeResponse {
        tree: nodes,
        status,
        message: None,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct EmbedQuery {
    pub uuid: Option<String>,
}

/// Embed URL for the requested (or first visible) dashboard
pub async fn embed(
    State(state): State<Arc<AppState>>,
    session: HostSession,
    Query(query): Query<EmbedQuery>,
) -> Result<Json<EmbedView>, ApiError> {
    state.ensure_can_view_any(session.profile_id)?;

    let dashboards = state.grafana.dashboards(None).await?;
    let mut visible = visible_dashboards(dashboards, &*state.rights.lock(), session.profile_id)?;

    // Search results are capped; a readable dashboard missing from the listing
    // is looked up by UID
    if let Some(uid) = query.uuid.as_deref() {
        let listed = visible.iter().any(|d| d.uid == uid);
        let readable = state.rights.lock().can_view(session.profile_id, uid)?;
        if !listed && readable {
            if let Some(dashboard) = state.grafana.dashboard(uid).await? {
                visible.push(dashboard);
            }
        }
    }

    let settings = state.grafana_settings()?;
    let token = state.issuer.issue(&settings.username)?;

    EmbedView::build(&settings.url, &visible, query.uuid.as_deref(), token.as_str())
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No dashboard available for this profile".to_string()))
}
