//! konakore file sync listener.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use konakore_core::config::AppConfig;
use konakore_filesync::{AppState, FileSync, create_router};
use konakore_remote::{DaemonClient, UrlProbe};
use konakore_storage::Library;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "konakore-filesync")]
#[command(version, about = "Mirrors liked posts into the local library", long_about = None)]
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

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
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

    tracing::info!("konakore-filesync v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    konakore_filesync::metrics::register_metrics();

    let library = Library::from_config(&config.library);
    library
        .health_check()
        .await
        .context("library root is not usable")?;
    tracing::info!(root = %library.root().display(), "Library root verified");

    let store = konakore_metadata::from_config(&config.database)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let daemon = DaemonClient::from_config(&config.daemon).context("invalid daemon configuration")?;
    tracing::info!(transport = ?daemon.transport(), "Download daemon client ready");
    let probe = UrlProbe::new(config.file_sync.probe_timeout());

    let sync = Arc::new(FileSync::new(
        store,
        library,
        daemon,
        probe,
        config.file_sync.batch_size,
    ));
    let state = AppState::new(config.clone(), sync);
    let controller = state.controller.clone();

    if config.file_sync.start_on_boot {
        // Catch up on likes recorded while the listener was down.
        controller.start().await;
    }

    let app = create_router(state);
    let addr: SocketAddr = config
        .file_sync
        .bind
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller.shutdown().await;
    tracing::info!("File sync listener stopped");
    Ok(())
}
