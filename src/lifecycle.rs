//! Install / Uninstall
//!
//! Install is idempotent: it creates the rights table, seeds missing Grafana
//! settings and generates the signing key pair unless one is already present.
//! Uninstall drops the rights table. Settings and keys are kept so a reinstall
//! reuses the key Grafana already trusts.

use crate::config::Config;
use crate::keys::ensure_key_pair;
use crate::rights::RightsStore;
use crate::settings::SettingsStore;
use anyhow::{Context, Result};
use tracing::info;

/// What an install run changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Settings values written because they were missing
    pub settings_seeded: usize,
    /// A new key pair was generated
    pub keys_generated: bool,
}

pub fn install(config: &Config) -> Result<InstallReport> {
    RightsStore::open(&config.db_path).context("Failed to create rights table")?;

    let mut settings = SettingsStore::open(&config.db_path)?;
    let settings_seeded = config.grafana_seed.install_defaults(&mut settings)?;

    let keys_generated = ensure_key_pair(&config.keys_dir)
        .with_context(|| format!("Failed to prepare keys in {}", config.keys_dir.display()))?;

    info!(
        "Installed: {} settings seeded, key pair {}",
        settings_seeded,
        if keys_generated { "generated" } else { "kept" }
    );

    Ok(InstallReport {
        settings_seeded,
        keys_generated,
    })
}

pub fn uninstall(config: &Config) -> Result<()> {
    if !config.db_path.exists() {
        info!("Nothing to uninstall at {}", config.db_path.display());
        return Ok(());
    }

    RightsStore::open(&config.db_path)?.drop_table()?;

    info!("Uninstalled; settings and keys left in {}", config.data_dir.display());
    Ok(())
}
