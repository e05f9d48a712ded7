//! Grafana Embed Bridge
//!
//! Lets helpdesk users view Grafana dashboards inside the helpdesk without a
//! second login.
//!
//! # Features
//!
//! - **Embed tokens**: RS256 identity tokens Grafana's JWT auth accepts
//! - **JWKS**: public key published for Grafana's `jwk_set_url`
//! - **Dashboard tree**: folder hierarchy rebuilt from Grafana search results,
//!   repaired when the service account only sees part of it
//! - **Profile rights**: per-profile, per-dashboard read access
//!
//! # Architecture
//!
//! ```text
//! Browser ──► Helpdesk ──► grafana-embed ──► Grafana API
//!   │        (session hdrs)      │
//!   │                            ├── Keys (RSA PEM files)
//!   │                            ├── Token (RS256 + JWKS)
//!   │                            ├── Tree (folders + dashboards)
//!   │                            └── Rights / Settings (SQLite)
//!   │
//!   └── <iframe src=".../d/<uid>?kiosk&auth_token=…"> ──► Grafana
//!                                 Grafana ──► GET /public/jwks
//! ```

pub mod config;
pub mod embed;
pub mod grafana;
pub mod keys;
pub mod lifecycle;
pub mod rights;
pub mod server;
pub mod settings;
pub mod token;
pub mod tree;

pub use config::Config;
pub use embed::EmbedView;
pub use grafana::{GrafanaApi, GrafanaClient, GrafanaError, LiveGrafana};
pub use keys::{ensure_key_pair, KeyCache, KeyError, KeyPair};
pub use lifecycle::{install, uninstall, InstallReport};
pub use rights::{AccessRights, ProfileId, Rights, RightsStore, StaticRights};
pub use server::EmbedServer;
pub use settings::{GrafanaSettings, SettingsStore, SettingsUpdate};
pub use token::{issue_token, publish_jwks, EmbedToken, JwkSet, TokenError, TokenIssuer};
pub use tree::{Dashboard, Folder, FolderTree, TreeNode};
