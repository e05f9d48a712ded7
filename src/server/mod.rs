//! Embed HTTP Server
//!
//! Axum server exposing the JWKS document, token issuance, the dashboard tree,
//! the embed view and the administration endpoints. The helpdesk host sits in
//! front of it and forwards the user's session as headers (see [`session`]).

pub mod api;
pub mod error;
pub mod session;

use crate::config::Config;
use crate::grafana::{GrafanaApi, LiveGrafana};
use crate::keys::KeyCache;
use crate::rights::RightsStore;
use crate::settings::SettingsStore;
use crate::token::TokenIssuer;
use anyhow::Result;
use api::AppState;
use axum::{
    http::{header, Method},
    Router,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use api::routes;
pub use error::{ApiError, ErrorResponse};
pub use session::{HostSession, ManagerSession};

/// Embed server
pub struct EmbedServer {
    config: Config,
    state: Arc<AppState>,
}

impl EmbedServer {
    /// Open the stores and wire the live Grafana client
    pub fn from_config(config: Config) -> Result<Self> {
        let rights = Arc::new(Mutex::new(RightsStore::open(&config.db_path)?));
        let settings = Arc::new(Mutex::new(SettingsStore::open(&config.db_path)?));
        let grafana: Arc<dyn GrafanaApi> =
            Arc::new(LiveGrafana::new(settings.clone(), config.verify_tls)?);

        let state = AppState::new(
            TokenIssuer::new(KeyCache::new(config.keys_dir.clone())),
            grafana,
            rights,
            settings,
            config.jwks_url(),
        );

        Ok(Self::with_state(config, state))
    }

    pub fn with_state(config: Config, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Build the router with all routes and middleware
    pub fn build_router(&self) -> Router {
        // The iframe host is a different origin; only GET and JSON bodies cross it
        let cors = CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers([header::CONTENT_TYPE]);

        let mut router = routes(self.state.clone()).layer(cors);

        if self.config.log_requests {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Start the server and run until shutdown signal
    pub async fn run(self) -> Result<()> {
        let addr = self.config.socket_addr();
        let router = self.build_router();

        if let Err(e) = self.state.issuer.jwks() {
            warn!("Signing keys not loadable yet ({}); run --install", e);
        }

        info!("Starting grafana-embed on {}", addr);
        info!("JWKS URL for Grafana: {}", self.config.jwks_url());

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server shut down gracefully");
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
