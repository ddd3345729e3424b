//! Operator CLI for konakore.

mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use konakore_core::config::AppConfig;
use konakore_metadata::MetadataStore;
use konakore_remote::{TriggerAction, TriggerClient};
use output::Stats;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "konactl")]
#[command(about = "Operator CLI for konakore")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "KONAKORE_CONFIG",
        default_value = "config/konakore.toml"
    )]
    config: String,

    /// File sync listener URL (overrides notifier.file_sync_url)
    #[arg(long, global = true)]
    listener: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mark a post liked and wake the file sync loop
    Like {
        /// Post id
        post_id: i64,
    },
    /// Clear a post's liked flag and wake the file sync loop
    Unlike {
        /// Post id
        post_id: i64,
    },
    /// Start, stop or query the file sync loop
    Trigger {
        /// start, stop or status
        #[arg(default_value = "start")]
        action: TriggerAction,
    },
    /// Check the file sync listener
    Health,
    /// Run one deep reconciliation of the library
    Reconcile,
    /// Show persisted job state
    Jobs,
    /// Show catalog and file sync counts
    Stats,
}

fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        figment = figment.merge(Toml::file(path));
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

fn trigger_client(config: &AppConfig, listener: Option<&str>) -> Result<TriggerClient> {
    let client = match listener {
        Some(url) => TriggerClient::new(url, config.notifier.timeout()),
        None => TriggerClient::from_config(&config.notifier),
    };
    client.context("invalid file sync listener URL")
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn MetadataStore>> {
    konakore_metadata::from_config(&config.database)
        .await
        .context("failed to connect to database")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        config,
        listener,
        command,
    } = Cli::parse();
    let config = load_config(&config)?;
    let listener = listener.as_deref();

    match command {
        Commands::Like { post_id } => handle_like(&config, listener, post_id, true).await,
        Commands::Unlike { post_id } => handle_like(&config, listener, post_id, false).await,
        Commands::Trigger { action } => {
            let response = trigger_client(&config, listener)?.trigger(action).await?;
            println!("{}", output::render_trigger(&response));
            Ok(())
        }
        Commands::Health => {
            let health = trigger_client(&config, listener)?.health().await?;
            println!("{}", output::render_health(&health));
            Ok(())
        }
        Commands::Reconcile => {
            let response = trigger_client(&config, listener)?.reconcile().await?;
            println!("{}", output::render_trigger(&response));
            Ok(())
        }
        Commands::Jobs => {
            let store = open_store(&config).await?;
            let rows = store.list_job_states().await?;
            println!("{}", output::render_jobs(&rows));
            Ok(())
        }
        Commands::Stats => {
            let store = open_store(&config).await?;
            let stats = Stats {
                posts: store.post_counts().await?,
                tags: store.count_tags().await?,
                edges: store.count_post_tags().await?,
                file_sync: store.file_sync_counts().await?,
            };
            println!("{}", output::render_stats(&stats));
            Ok(())
        }
    }
}

/// Set the liked flag, then notify the listener. A failed notification is
/// logged by the notifier and never fails the command.
async fn handle_like(
    config: &AppConfig,
    listener: Option<&str>,
    post_id: i64,
    liked: bool,
) -> Result<()> {
    let store = open_store(config).await?;
    if !store.set_post_liked(post_id, liked).await? {
        anyhow::bail!("post {post_id} not found");
    }
    println!(
        "Post {post_id} {}",
        if liked { "liked" } else { "unliked" }
    );

    trigger_client(config, listener)?.notify().await;
    Ok(())
}
