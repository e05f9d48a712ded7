//! Embed View
//!
//! Picks the dashboard to show and builds the kiosk-mode iframe URL that
//! carries the embed token:
//!
//! ```text
//! https://grafana.domain/d/abc123/sales?kiosk&auth_token=<jws>
//! ```
//!
//! The browser swaps the `auth_token` value every refresh interval; a failed
//! refresh keeps the current URL.

use crate::token::REFRESH_INTERVAL_SECS;
use crate::tree::Dashboard;
use serde::Serialize;

const DASHBOARD_PATH_PREFIX: &str = "/d/";
const TOKEN_PARAM: &str = "auth_token=";

/// Cut a dashboard URL so it starts at `/d/`.
///
/// Grafana served under a sub-path reports URLs like `/grafana/d/abc/sales`;
/// the configured base URL already contains that sub-path. URLs without a
/// `/d/` segment are returned unchanged.
pub fn normalize_dashboard_path(url: &str) -> &str {
    match url.find(DASHBOARD_PATH_PREFIX) {
        Some(pos) => &url[pos..],
        None => url,
    }
}

/// Full iframe URL for a dashboard
pub fn embed_url(grafana_url: &str, dashboard_url: &str, token: &str) -> String {
    format!(
        "{}{}?kiosk&{}{}",
        grafana_url.trim_end_matches('/'),
        normalize_dashboard_path(dashboard_url),
        TOKEN_PARAM,
        token
    )
}

/// Replace everything after `auth_token=` with `token`.
///
/// Returns `None` when the URL carries no token parameter.
pub fn replace_token(url: &str, token: &str) -> Option<String> {
    let pos = url.find(TOKEN_PARAM)?;
    Some(format!("{}{}", &url[..pos + TOKEN_PARAM.len()], token))
}

/// Requested dashboard when visible, otherwise the first visible one
pub fn select_dashboard<'a>(dashboards: &'a [Dashboard], requested: Option<&str>) -> Option<&'a Dashboard> {
    requested
        .and_then(|uid| dashboards.iter().find(|d| d.uid == uid))
        .or_else(|| dashboards.first())
}

/// Dashboard picker entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardChoice {
    pub uid: String,
    pub title: String,
}

/// Everything the host page needs to render the embedded dashboard
#[derive(Debug, Clone, Serialize)]
pub struct EmbedView {
    pub dashboard: Dashboard,
    pub url: String,
    pub refresh_interval_secs: u64,
    pub dashboards: Vec<DashboardChoice>,
}

impl EmbedView {
    /// Build the view over already-filtered dashboards; `None` when there is
    /// nothing to show
    pub fn build(
        grafana_url: &str,
        dashboards: &[Dashboard],
        requested: Option<&str>,
        token: &str,
    ) -> Option<Self> {
        let dashboard = select_dashboard(dashboards, requested)?;

        Some(Self {
            url: embed_url(grafana_url, &dashboard.url, token),
            dashboard: dashboard.clone(),
            refresh_interval_secs: REFRESH_INTERVAL_SECS,
            dashboards: dashboards
                .iter()
                .map(|d| DashboardChoice {
                    uid: d.uid.clone(),
                    title: d.title.clone(),
                })
                .collect(),
        })
    }
}
