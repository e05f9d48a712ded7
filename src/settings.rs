//! Settings Store
//!
//! Key-value configuration values grouped by context, plus the typed Grafana
//! connection settings stored under the `plugin:grafana` context.

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Context holding the Grafana connection settings
pub const GRAFANA_CONTEXT: &str = "plugin:grafana";

/// Default Grafana request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// SQLite key-value store
pub struct SettingsStore {
    conn: Connection,
}

impl SettingsStore {
    /// Open or create the settings database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            conn: Connection::open(path)?,
        };
        store.init_schema()?;

        debug!("Settings store opened: {}", path.display());
        Ok(store)
    }

    /// In-memory store (tests)
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS config_values (
                context TEXT NOT NULL,
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (context, name)
            );
            "#,
        )?;

        Ok(())
    }

    /// All values of a context
    pub fn get_values(&self, context: &str) -> Result<HashMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, value FROM config_values WHERE context = ?1")?;

        let values = stmt
            .query_map(params![context], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<HashMap<String, String>>>()?;

        Ok(values)
    }

    /// Set (insert or overwrite) values of a context
    pub fn set_values(&mut self, context: &str, values: &[(&str, &str)]) -> Result<()> {
        let tx = self.conn.transaction()?;

        for (name, value) in values {
            tx.execute(
                "INSERT INTO config_values (context, name, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (context, name) DO UPDATE SET value = excluded.value",
                params![context, name, value],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Insert values only where the name is not set yet
    pub fn set_defaults(&mut self, context: &str, values: &[(&str, &str)]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;

        for (name, value) in values {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO config_values (context, name, value) VALUES (?1, ?2, ?3)",
                params![context, name, value],
            )?;
        }

        tx.commit()?;
        Ok(inserted)
    }
}

/// Grafana connection settings
#[derive(Clone, Default, PartialEq, Eq)]
pub struct GrafanaSettings {
    /// Grafana base URL, e.g. `https://grafana.domain`
    pub url: String,
    /// Service account used for API calls and as embed token subject
    pub username: String,
    pub password: String,
    /// Light theme for the embedded dashboards
    pub lightmode: bool,
    pub timeout_secs: u64,
}

impl fmt::Debug for GrafanaSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrafanaSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .field("lightmode", &self.lightmode)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Settings update submitted by an administrator.
///
/// Absent fields are left unchanged. An empty password is treated as absent so
/// the stored one is never wiped by a form that does not echo it back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub lightmode: Option<bool>,
    pub timeout_secs: Option<u64>,
}

impl GrafanaSettings {
    /// Load from the store; missing values fall back to defaults
    pub fn load(store: &SettingsStore) -> Result<Self> {
        let values = store.get_values(GRAFANA_CONTEXT)?;
        let get = |name: &str| values.get(name).cloned().unwrap_or_default();

        Ok(Self {
            url: get("url"),
            username: get("username"),
            password: get("password"),
            lightmode: matches!(get("lightmode").as_str(), "1" | "true" | "on"),
            timeout_secs: get("timeout").parse().unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn save(&self, store: &mut SettingsStore) -> Result<()> {
        let timeout = self.timeout_secs.to_string();
        store.set_values(GRAFANA_CONTEXT, &self.as_pairs(&timeout))?;

        info!("Saved Grafana settings for {}", self.url);
        Ok(())
    }

    /// Seed missing values, keeping anything already stored
    pub fn install_defaults(&self, store: &mut SettingsStore) -> Result<usize> {
        let timeout = self.timeout_secs.to_string();
        store.set_defaults(GRAFANA_CONTEXT, &self.as_pairs(&timeout))
    }

    fn as_pairs<'a>(&'a self, timeout: &'a str) -> [(&'static str, &'a str); 5] {
        [
            ("url", self.url.as_str()),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("lightmode", if self.lightmode { "1" } else { "0" }),
            ("timeout", timeout),
        ]
    }

    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(url) = update.url {
            self.url = url;
        }
        if let Some(username) = update.username {
            self.username = username;
        }
        if let Some(password) = update.password.filter(|p| !p.is_empty()) {
            self.password = password;
        }
        if let Some(lightmode) = update.lightmode {
            self.lightmode = lightmode;
        }
        if let Some(timeout) = update.timeout_secs.filter(|t| *t > 0) {
            self.timeout_secs = timeout;
        }
    }

    /// Enough configuration to talk to Grafana
    pub fn is_valid(&self) -> bool {
        !self.url.is_empty() && !self.password.is_empty()
    }

    pub fn theme(&self) -> &'static str {
        if self.lightmode {
            "light"
        } else {
            "dark"
        }
    }
}
