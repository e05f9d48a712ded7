//! Grafana HTTP API Client
//!
//! Basic-auth JSON client for the handful of Grafana endpoints the embed flow
//! needs: folder and dashboard search, a login check and the service account's
//! theme preference.

use crate::settings::{GrafanaSettings, SettingsStore, DEFAULT_TIMEOUT_SECS};
use crate::tree::{Dashboard, Folder};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{redirect::Policy, Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Connect timeout for every Grafana call
pub const CONNECT_TIMEOUT_SECS: u64 = 2;

/// Grafana API errors
#[derive(Debug, Error)]
pub enum GrafanaError {
    #[error("Grafana is not configured (url and password are required)")]
    NotConfigured,

    #[error("Cannot reach Grafana: {0}")]
    Connect(String),

    #[error("Grafana request timed out; consider raising the timeout setting")]
    Timeout,

    #[error("Grafana returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected Grafana response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GrafanaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GrafanaError::Timeout
        } else if err.is_decode() {
            GrafanaError::Decode(err.to_string())
        } else {
            GrafanaError::Connect(err.to_string())
        }
    }
}

/// The Grafana calls the embed flow depends on
#[async_trait]
pub trait GrafanaApi: Send + Sync {
    /// All folders visible to the service account
    async fn folders(&self) -> Result<Vec<Folder>, GrafanaError>;

    /// Dashboards, optionally restricted to one folder
    async fn dashboards(&self, folder_uid: Option<&str>) -> Result<Vec<Dashboard>, GrafanaError>;

    /// A single dashboard by UID
    async fn dashboard(&self, uid: &str) -> Result<Option<Dashboard>, GrafanaError>;

    /// True when an authenticated search returns anything
    async fn check_login(&self) -> Result<bool, GrafanaError>;

    /// Set the service account's UI theme (`light` or `dark`)
    async fn set_theme(&self, theme: &str) -> Result<(), GrafanaError>;
}

/// Build the shared HTTP client: no redirects, short connect timeout
pub fn build_http_client(verify_tls: bool) -> Result<Client, GrafanaError> {
    Client::builder()
        .redirect(Policy::none())
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .danger_accept_invalid_certs(!verify_tls)
        .build()
        .map_err(|e| GrafanaError::Connect(e.to_string()))
}

#[derive(Debug, Serialize)]
struct Preferences<'a> {
    theme: &'a str,
}

/// Client bound to one set of connection settings
#[derive(Clone)]
pub struct GrafanaClient {
    http: Client,
    settings: GrafanaSettings,
}

impl GrafanaClient {
    pub fn new(settings: GrafanaSettings, verify_tls: bool) -> Result<Self, GrafanaError> {
        Ok(Self::with_http(build_http_client(verify_tls)?, settings))
    }

    /// Reuse an existing HTTP client
    pub fn with_http(http: Client, settings: GrafanaSettings) -> Self {
        Self { http, settings }
    }

    /// `{url}/api/`, trailing slashes of the configured URL removed
    pub fn base_url(&self) -> String {
        format!("{}/api/", self.settings.url.trim_end_matches('/'))
    }

    fn timeout(&self) -> Duration {
        match self.settings.timeout_secs {
            0 => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Send one request and decode the JSON answer
    async fn request<T, B>(
        &self,
        method: Method,
        resource: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<T, GrafanaError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        if !self.settings.is_valid() {
            return Err(GrafanaError::NotConfigured);
        }

        let url = format!("{}{}", self.base_url(), resource);
        debug!("Grafana {} {}", method, url);

        let mut request = self
            .http
            .request(method, &url)
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout());

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            warn!("Grafana {} answered HTTP {}", resource, status);
            return Err(GrafanaError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| GrafanaError::Decode(e.to_string()))
    }

    pub async fn folders(&self) -> Result<Vec<Folder>, GrafanaError> {
        self.request::<_, ()>(Method::GET, "search", &[("type", "dash-folder")], None)
            .await
    }

    pub async fn dashboards(&self, folder_uid: Option<&str>) -> Result<Vec<Dashboard>, GrafanaError> {
        let mut query = vec![("type", "dash-db")];
        if let Some(folder) = folder_uid.filter(|f| !f.is_empty()) {
            query.push(("folderUIDs", folder));
        }

        self.request::<_, ()>(Method::GET, "search", &query, None).await
    }

    pub async fn dashboard(&self, uid: &str) -> Result<Option<Dashboard>, GrafanaError> {
        let found: Vec<Dashboard> = self
            .request::<_, ()>(
                Method::GET,
                "search",
                &[("type", "dash-db"), ("dashboardUIDs", uid)],
                None,
            )
            .await?;

        Ok(found.into_iter().find(|d| d.uid == uid))
    }

    pub async fn check_login(&self) -> Result<bool, GrafanaError> {
        let data: serde_json::Value = self
            .request::<_, ()>(Method::GET, "search", &[], None)
            .await?;

        Ok(match data {
            serde_json::Value::Array(items) => !items.is_empty(),
            serde_json::Value::Object(map) => !map.is_empty(),
            _ => false,
        })
    }

    pub async fn set_theme(&self, theme: &str) -> Result<(), GrafanaError> {
        let _: serde_json::Value = self
            .request(Method::PUT, "user/preferences", &[], Some(&Preferences { theme }))
            .await?;

        debug!("Grafana theme set to {}", theme);
        Ok(())
    }
}

#[async_trait]
impl GrafanaApi for GrafanaClient {
    async fn folders(&self) -> Result<Vec<Folder>, GrafanaError> {
        GrafanaClient::folders(self).await
    }

    async fn dashboards(&self, folder_uid: Option<&str>) -> Result<Vec<Dashboard>, GrafanaError> {
        GrafanaClient::dashboards(self, folder_uid).await
    }

    async fn dashboard(&self, uid: &str) -> Result<Option<Dashboard>, GrafanaError> {
        GrafanaClient::dashboard(self, uid).await
    }

    async fn check_login(&self) -> Result<bool, GrafanaError> {
        GrafanaClient::check_login(self).await
    }

    async fn set_theme(&self, theme: &str) -> Result<(), GrafanaError> {
        GrafanaClient::set_theme(self, theme).await
    }
}

/// Grafana API reading its connection settings from the store on every call,
/// so an admin update applies to the next request.
#[derive(Clone)]
pub struct LiveGrafana {
    http: Client,
    settings: Arc<Mutex<SettingsStore>>,
}

impl LiveGrafana {
    pub fn new(settings: Arc<Mutex<SettingsStore>>, verify_tls: bool) -> Result<Self, GrafanaError> {
        Ok(Self {
            http: build_http_client(verify_tls)?,
            settings,
        })
    }

    fn client(&self) -> Result<GrafanaClient, GrafanaError> {
        let settings = GrafanaSettings::load(&self.settings.lock()).map_err(|e| {
            warn!("Failed to read Grafana settings: {}", e);
            GrafanaError::NotConfigured
        })?;

        Ok(GrafanaClient::with_http(self.http.clone(), settings))
    }
}

#[async_trait]
impl GrafanaApi for LiveGrafana {
    async fn folders(&self) -> Result<Vec<Folder>, GrafanaError> {
        self.client()?.folders().await
    }

    async fn dashboards(&self, folder_uid: Option<&str>) -> Result<Vec<Dashboard>, GrafanaError> {
        self.client()?.dashboards(folder_uid).await
    }

    async fn dashboard(&self, uid: &str) -> Result<Option<Dashboard>, GrafanaError> {
        self.client()?.dashboard(uid).await
    }

    async fn check_login(&self) -> Result<bool, GrafanaError> {
        self.client()?.check_login().await
    }

    async fn set_theme(&self, theme: &str) -> Result<(), GrafanaError> {
        self.client()?.set_theme(theme).await
    }
}
