//! Configuration management
//!
//! Process configuration comes from environment variables (a `.env` file is
//! loaded by the binary first). Grafana connection values here only seed the
//! settings store at install time; at runtime the store is authoritative.

use crate::settings::{GrafanaSettings, DEFAULT_TIMEOUT_SECS};
use anyhow::Result;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Default listen port
pub const DEFAULT_PORT: u16 = 8090;

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address (default: 127.0.0.1)
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Root for the database and keys
    pub data_dir: PathBuf,
    /// SQLite database holding settings and rights
    pub db_path: PathBuf,
    /// Directory holding `private_key.pem` / `public_key.pem`
    pub keys_dir: PathBuf,
    /// Externally reachable base URL, used for the JWKS URL shown to admins
    pub public_url: Option<String>,
    /// Enable request logging
    pub log_requests: bool,
    /// Verify Grafana's TLS certificate
    pub verify_tls: bool,
    /// Values written to the settings store on install when absent
    pub grafana_seed: GrafanaSettings,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            db_path: data_dir.join("grafana.db"),
            keys_dir: data_dir.join("keys"),
            data_dir,
            public_url: None,
            log_requests: true,
            verify_tls: false,
            grafana_seed: GrafanaSettings {
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                ..Default::default()
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("GRAFANA_EMBED_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid GRAFANA_EMBED_BIND_ADDR '{}': {}", addr, e))?;
        }

        if let Some(port) = lookup("GRAFANA_EMBED_PORT") {
            config.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid GRAFANA_EMBED_PORT '{}': {}", port, e))?;
        }

        if let Some(dir) = lookup("GRAFANA_EMBED_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config.db_path = lookup("GRAFANA_EMBED_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| config.data_dir.join("grafana.db"));

        config.keys_dir = lookup("GRAFANA_EMBED_KEYS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| config.data_dir.join("keys"));

        config.public_url = lookup("GRAFANA_EMBED_PUBLIC_URL").filter(|u| !u.is_empty());

        if let Some(val) = lookup("GRAFANA_EMBED_LOG_REQUESTS") {
            config.log_requests = is_truthy(&val);
        }

        if let Some(val) = lookup("GRAFANA_VERIFY_TLS") {
            config.verify_tls = is_truthy(&val);
        }

        let seed = &mut config.grafana_seed;
        seed.url = lookup("GRAFANA_URL").unwrap_or_default();
        seed.username = lookup("GRAFANA_USERNAME").unwrap_or_default();
        seed.password = lookup("GRAFANA_PASSWORD").unwrap_or_default();
        seed.lightmode = lookup("GRAFANA_LIGHTMODE").is_some_and(|v| is_truthy(&v));
        seed.timeout_secs = lookup("GRAFANA_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|t| *t > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        if !config.is_localhost() {
            tracing::warn!(
                "Binding to {} - host session headers must only come from a trusted proxy",
                config.bind_addr
            );
        }

        Ok(config)
    }

    /// Check if bound to localhost only
    pub fn is_localhost(&self) -> bool {
        self.bind_addr.is_loopback()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Public base URL, falling back to the bind address
    pub fn base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.bind_addr, self.port),
        }
    }

    /// URL Grafana's `jwk_set_url` must point at
    pub fn jwks_url(&self) -> String {
        format!("{}/public/jwks", self.base_url())
    }
}

fn is_truthy(val: &str) -> bool {
    matches!(val, "true" | "1" | "yes" | "on")
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("grafana-embed")
}

// Platform-specific dirs fallback
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .ok()
                .or_else(|| {
                    std::env::var("HOME")
                        .map(|h| PathBuf::from(h).join(".local/share"))
                        .ok()
                })
        }

        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
                .ok()
        }

        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").map(PathBuf::from).ok()
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            None
        }
    }
}
