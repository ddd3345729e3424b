//! konakore scheduler binary.
//!
//! Runs backfill, post tag association and legacy like migration as
//! long-lived workers, plus the recent-refresh and tag-catalog schedules.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use konakore_core::config::AppConfig;
use konakore_remote::CatalogClient;
use konakore_scheduler::Scheduler;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "konakore-scheduler")]
#[command(version, about = "Konachan catalog ingestion workers", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "KONAKORE_CONFIG",
        default_value = "config/konakore.toml"
    )]
    config: String,
}

fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}, using defaults and environment", path);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("KONAKORE_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("konakore-scheduler v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    let store = konakore_metadata::from_config(&config.database)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let catalog =
        CatalogClient::from_config(&config.remote).context("failed to build catalog client")?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                signal.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "could not listen for Ctrl-C"),
        }
    });

    Scheduler::new(store, catalog, config)
        .run(shutdown)
        .await
        .context("scheduler stopped with an error")?;

    tracing::info!("Scheduler stopped");
    Ok(())
}
