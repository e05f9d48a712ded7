//! HTTP API Integration Tests
//!
//! Routes exercised in-process with `oneshot`, Grafana replaced by a fixed
//! in-memory listing.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use grafana_embed::grafana::{GrafanaApi, GrafanaError};
use grafana_embed::keys::{KeyCache, KeyPair};
use grafana_embed::rights::{Rights, RightsStore};
use grafana_embed::server::{api::AppState, routes};
use grafana_embed::settings::{GrafanaSettings, SettingsStore};
use grafana_embed::token::{EmbedClaims, TokenIssuer};
use grafana_embed::tree::{Dashboard, Folder};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const PRIVATE_PEM: &str = include_str!("fixtures/private_key.pem");
const PUBLIC_PEM: &str = include_str!("fixtures/public_key.pem");

/// Fixed Grafana listing; `fail` simulates an unreachable instance and
/// `unlisted` dashboards are only found by UID lookup
#[derive(Default)]
struct FakeGrafana {
    folders: Vec<Folder>,
    dashboards: Vec<Dashboard>,
    unlisted: Vec<Dashboard>,
    fail: bool,
    theme: Mutex<Option<String>>,
}

#[async_trait]
impl GrafanaApi for FakeGrafana {
    async fn folders(&self) -> Result<Vec<Folder>, GrafanaError> {
        if self.fail {
            return Err(GrafanaError::Connect("connection refused".to_string()));
        }
        Ok(self.folders.clone())
    }

    async fn dashboards(&self, _folder_uid: Option<&str>) -> Result<Vec<Dashboard>, GrafanaError> {
        if self.fail {
            return Err(GrafanaError::Connect("connection refused".to_string()));
        }
        Ok(self.dashboards.clone())
    }

    async fn dashboard(&self, uid: &str) -> Result<Option<Dashboard>, GrafanaError> {
        Ok(self
            .dashboards
            .iter()
            .chain(&self.unlisted)
            .find(|d| d.uid == uid)
            .cloned())
    }

    async fn check_login(&self) -> Result<bool, GrafanaError> {
        Ok(!self.fail)
    }

    async fn set_theme(&self, theme: &str) -> Result<(), GrafanaError> {
        *self.theme.lock() = Some(theme.to_string());
        Ok(())
    }
}

struct TestApp {
    router: Router,
    rights: Arc<Mutex<RightsStore>>,
    settings: Arc<Mutex<SettingsStore>>,
    grafana: Arc<FakeGrafana>,
}

fn listing() -> FakeGrafana {
    FakeGrafana {
        folders: vec![Folder {
            uid: "F1".to_string(),
            title: "Finance".to_string(),
            folder_uid: None,
        }],
        dashboards: vec![
            Dashboard {
                uid: "d1".to_string(),
                title: "Sales".to_string(),
                folder_uid: Some("F1".to_string()),
                folder_title: Some("Finance".to_string()),
                url: "/grafana/d/d1/sales".to_string(),
            },
            Dashboard {
                uid: "d2".to_string(),
                title: "Ops".to_string(),
                folder_uid: None,
                folder_title: None,
                url: "/d/d2/ops".to_string(),
            },
        ],
        ..Default::default()
    }
}

fn app(grafana: FakeGrafana) -> TestApp {
    let rights = Arc::new(Mutex::new(RightsStore::open_in_memory().unwrap()));
    let settings = Arc::new(Mutex::new(SettingsStore::open_in_memory().unwrap()));
    GrafanaSettings {
        url: "https://grafana.example/".to_string(),
        username: "svc".to_string(),
        password: "secret".to_string(),
        lightmode: false,
        timeout_secs: 5,
    }
    .save(&mut settings.lock())
    .unwrap();

    let grafana = Arc::new(grafana);
    let keys = KeyCache::preloaded(KeyPair::from_pem(PRIVATE_PEM, PUBLIC_PEM).unwrap());
    let state = AppState::new(
        TokenIssuer::new(keys),
        grafana.clone(),
        rights.clone(),
        settings.clone(),
        "http://127.0.0.1:8090/public/jwks",
    );

    TestApp {
        router: routes(Arc::new(state)),
        rights,
        settings,
        grafana,
    }
}

fn request(method: &str, uri: &str, profile: Option<i64>, manager: bool, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(profile) = profile {
        builder = builder
            .header("X-Host-User-Id", "42")
            .header("X-Host-Profile-Id", profile.to_string());
    }
    if manager {
        builder = builder.header("X-Host-Can-Manage", "1");
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_jwks_is_public() {
    let app = app(listing());
    let (status, json) = send(&app, request("GET", "/public/jwks", None, false, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["keys"][0]["kid"], "grafana-key-1");
}

#[tokio::test]
async fn test_token_requires_session() {
    let app = app(listing());
    let (status, json) = send(&app, request("GET", "/api/token", None, false, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Unauthorized");
}

#[tokio::test]
async fn test_token_requires_a_readable_dashboard() {
    let app = app(listing());
    let (status, _) = send(&app, request("POST", "/api/token", Some(3), false, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.rights.lock().set_right(3, "d1", Rights::READ).unwrap();
    let (status, json) = send(&app, request("POST", "/api/token", Some(3), false, None)).await;
    assert_eq!(status, StatusCode::OK);

    let key = DecodingKey::from_rsa_pem(PUBLIC_PEM.as_bytes()).unwrap();
    let claims = decode::<EmbedClaims>(
        json["token"].as_str().unwrap(),
        &key,
        &Validation::new(Algorithm::RS256),
    )
    .unwrap()
    .claims;
    assert_eq!(claims.sub, "svc");
    assert_eq!(json["refresh_interval_secs"], 3300);
}

#[tokio::test]
async fn test_tree_filtered_by_profile() {
    let app = app(listing());
    app.rights.lock().set_right(3, "d2", Rights::READ).unwrap();

    let (status, json) = send(&app, request("GET", "/api/dashboards/tree", Some(3), false, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["tree"][0]["uid"], "F1");
    assert!(json["tree"][0].get("dashboards").is_none());
    assert_eq!(json["tree"][1]["uid"], "d2");
}

#[tokio::test]
async fn test_tree_leaves_carry_embed_url() {
    let app = app(listing());
    app.rights.lock().set_right(3, "d1", Rights::READ).unwrap();

    let (status, json) = send(&app, request("GET", "/api/dashboards/tree", Some(3), false, None)).await;

    assert_eq!(status, StatusCode::OK);
    let leaf = &json["tree"][0]["dashboards"][0];
    assert_eq!(leaf["uid"], "d1");
    assert_eq!(leaf["url"], "/grafana/d/d1/sales");
    assert!(leaf["embedUrl"]
        .as_str()
        .unwrap()
        .starts_with("https://grafana.example/d/d1/sales?kiosk&auth_token="));
}

#[tokio::test]
async fn test_tree_distinguishes_fetch_failure() {
    let failing = app(FakeGrafana {
        fail: true,
        ..Default::default()
    });
    let (status, json) = send(&failing, request("GET", "/api/dashboards/tree", Some(3), false, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "fetch_failed");
    assert!(json["message"].as_str().unwrap().contains("connection refused"));

    let empty = app(FakeGrafana::default());
    let (_, json) = send(&empty, request("GET", "/api/dashboards/tree", Some(3), false, None)).await;
    assert_eq!(json["status"], "empty");
}

#[tokio::test]
async fn test_embed_view() {
    let app = app(listing());
    app.rights
        .lock()
        .set_rights_for_all(3, ["d1", "d2"], Rights::READ)
        .unwrap();

    let (status, json) = send(&app, request("GET", "/api/dashboards/embed?uuid=d1", Some(3), false, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dashboard"]["uid"], "d1");
    let url = json["url"].as_str().unwrap();
    assert!(url.starts_with("https://grafana.example/d/d1/sales?kiosk&auth_token="));
    assert_eq!(json["dashboards"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_embed_falls_back_to_first_visible() {
    let app = app(listing());
    app.rights.lock().set_right(3, "d2", Rights::READ).unwrap();

    let (status, json) = send(&app, request("GET", "/api/dashboards/embed?uuid=d1", Some(3), false, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dashboard"]["uid"], "d2");
}

#[tokio::test]
async fn test_embed_looks_up_unlisted_dashboard() {
    let mut grafana = listing();
    grafana.unlisted.push(Dashboard {
        uid: "d9".to_string(),
        title: "Archive".to_string(),
        folder_uid: None,
        folder_title: None,
        url: "/d/d9/archive".to_string(),
    });
    let app = app(grafana);
    app.rights
        .lock()
        .set_rights_for_all(3, ["d2", "d9"], Rights::READ)
        .unwrap();

    let (status, json) = send(&app, request("GET", "/api/dashboards/embed?uuid=d9", Some(3), false, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dashboard"]["uid"], "d9");
    assert!(json["url"]
        .as_str()
        .unwrap()
        .starts_with("https://grafana.example/d/d9/archive?kiosk&auth_token="));
    assert_eq!(json["dashboards"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_embed_skips_lookup_without_read_right() {
    let mut grafana = listing();
    grafana.unlisted.push(Dashboard {
        uid: "d9".to_string(),
        title: "Archive".to_string(),
        folder_uid: None,
        folder_title: None,
        url: "/d/d9/archive".to_string(),
    });
    let app = app(grafana);
    app.rights.lock().set_right(3, "d2", Rights::READ).unwrap();

    let (status, json) = send(&app, request("GET", "/api/dashboards/embed?uuid=d9", Some(3), false, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dashboard"]["uid"], "d2");
}

#[tokio::test]
async fn test_rights_admin_requires_manager() {
    let app = app(listing());
    let (status, _) = send(&app, request("GET", "/api/profiles/3/rights", Some(1), false, None)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_rights_admin_roundtrip() {
    let app = app(listing());

    let body = serde_json::json!({ "dashboards": { "d1": 1, "d2": 0 } });
    let (status, json) = send(&app, request("PUT", "/api/profiles/3/rights", Some(1), true, Some(body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["rights"], 2);

    let (status, json) = send(&app, request("GET", "/api/profiles/3/rights", Some(1), true, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dashboards"][0]["uid"], "d1");
    assert_eq!(json["dashboards"][0]["rights"], 1);
    assert_eq!(json["dashboards"][1]["rights"], 0);
}

#[tokio::test]
async fn test_set_all_rights() {
    let app = app(listing());

    let body = serde_json::json!({ "allow": true });
    let (status, json) = send(&app, request("POST", "/api/profiles/3/rights/all", Some(1), true, Some(body))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["rights"], 2);
    assert_eq!(app.rights.lock().rights_for_profile(3).unwrap().len(), 2);
}

#[tokio::test]
async fn test_config_hides_password() {
    let app = app(listing());
    let (status, json) = send(&app, request("GET", "/api/config", Some(1), true, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["password_set"], true);
    assert!(json.get("password").is_none());
    assert_eq!(json["jwks_url"], "http://127.0.0.1:8090/public/jwks");
}

#[tokio::test]
async fn test_config_update_keeps_password_and_pushes_theme() {
    let app = app(listing());

    let body = serde_json::json!({ "url": "https://other.example", "password": "", "lightmode": true });
    let (status, json) = send(&app, request("PUT", "/api/config", Some(1), true, Some(body))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["url"], "https://other.example");

    let stored = GrafanaSettings::load(&app.settings.lock()).unwrap();
    assert_eq!(stored.password, "secret");
    assert!(stored.lightmode);
    assert_eq!(app.grafana.theme.lock().as_deref(), Some("light"));
}

#[tokio::test]
async fn test_config_rejects_bad_url() {
    let app = app(listing());

    let body = serde_json::json!({ "url": "not a url" });
    let (status, _) = send(&app, request("PUT", "/api/config", Some(1), true, Some(body))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_config_status() {
    let app = app(listing());
    let (status, json) = send(&app, request("GET", "/api/config/status", Some(1), true, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["configured"], true);
    assert_eq!(json["api_login"], true);
}

#[tokio::test]
async fn test_health_probes() {
    let app = app(listing());

    let (status, json) = send(&app, request("GET", "/api/health", None, false, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");

    let (status, _) = send(&app, request("GET", "/api/readyz", None, false, None)).await;
    assert_eq!(status, StatusCode::OK);
}
