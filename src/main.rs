//! grafana-embed - Entry Point
//!
//! Modes:
//! - Default: HTTP server
//! - --install: create tables, seed settings, generate keys
//! - --uninstall: drop the rights table
//! - --jwks: print the JWKS document

use grafana_embed::{install, uninstall, Config, EmbedServer, KeyCache, TokenIssuer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let install_mode = args.iter().any(|a| a == "--install");
    let uninstall_mode = args.iter().any(|a| a == "--uninstall");
    let jwks_mode = args.iter().any(|a| a == "--jwks");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("grafana-embed v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: grafana-embed [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --install      Create tables, seed settings, generate signing keys");
        println!("  --uninstall    Drop the rights table (settings and keys are kept)");
        println!("  --jwks         Print the JWKS document and exit");
        println!("  --help, -h     Show this help");
        println!();
        println!("Default: Run the HTTP server");
        println!();
        println!("Environment variables:");
        println!("  GRAFANA_EMBED_BIND_ADDR   Listen address (default: 127.0.0.1)");
        println!("  GRAFANA_EMBED_PORT        Listen port (default: 8090)");
        println!("  GRAFANA_EMBED_DATA_DIR    Database and keys root");
        println!("  GRAFANA_EMBED_PUBLIC_URL  Public base URL for the JWKS link");
        println!("  GRAFANA_URL               Grafana base URL (seeded on install)");
        println!("  GRAFANA_USERNAME          Service account (seeded on install)");
        println!("  GRAFANA_PASSWORD          Service account password (seeded on install)");
        println!("  GRAFANA_VERIFY_TLS        Verify Grafana's certificate (default: false)");
        println!("  LOG_FORMAT                'json' for JSON logs");
        return Ok(());
    }

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(!install_mode && !uninstall_mode && !jwks_mode)
            .init();
    }

    let config = Config::from_env()?;

    if install_mode {
        let report = install(&config)?;
        println!(
            "Installed: {} settings seeded, signing keys {}",
            report.settings_seeded,
            if report.keys_generated { "generated" } else { "already present" }
        );
        println!("Set Grafana's [auth.jwt] jwk_set_url to {}", config.jwks_url());
    } else if uninstall_mode {
        uninstall(&config)?;
    } else if jwks_mode {
        let issuer = TokenIssuer::new(KeyCache::new(config.keys_dir.clone()));
        println!("{}", serde_json::to_string_pretty(&issuer.jwks()?)?);
    } else {
        info!("grafana-embed v{}", env!("CARGO_PKG_VERSION"));

        let server = EmbedServer::from_config(config)?;
        server.run().await?;
    }

    Ok(())
}
