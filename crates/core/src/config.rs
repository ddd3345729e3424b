//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// PostgreSQL connection configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL. Takes precedence over the individual fields.
    #[serde(default)]
    pub url: Option<String>,
    /// Database host.
    #[serde(default = "default_db_host")]
    pub host: String,
    /// Database port.
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Database name.
    #[serde(default = "default_db_name")]
    pub database: String,
    /// Database username.
    #[serde(default = "default_db_user")]
    pub username: String,
    /// Database password.
    /// WARNING: Prefer KONAKORE_DATABASE__PASSWORD over storing it in a file.
    #[serde(default)]
    pub password: String,
    /// Maximum connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Statement timeout in milliseconds.
    #[serde(default)]
    pub statement_timeout_ms: Option<u64>,
    /// Connection attempts at startup before giving up.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Delay between connection attempts.
    #[serde(default = "default_connect_retry_delay_secs")]
    pub connect_retry_delay_secs: u64,
}

fn default_db_host() -> String {
    "postgres".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "konakore".to_string()
}

fn default_db_user() -> String {
    "konakore".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_connect_retry_delay_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_db_host(),
            port: default_db_port(),
            database: default_db_name(),
            username: default_db_user(),
            password: String::new(),
            max_connections: default_max_connections(),
            statement_timeout_ms: None,
            connect_attempts: default_connect_attempts(),
            connect_retry_delay_secs: default_connect_retry_delay_secs(),
        }
    }
}

impl DatabaseConfig {
    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_secs(self.connect_retry_delay_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_none() && (self.host.is_empty() || self.database.is_empty()) {
            return Err("database config requires either 'url' or 'host' + 'database'".to_string());
        }
        if self.connect_attempts == 0 {
            return Err("database.connect_attempts must be at least 1".to_string());
        }
        if self.max_connections == 0 {
            return Err("database.max_connections must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Remote catalog configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Catalog base URL.
    #[serde(default = "default_remote_base_url")]
    pub base_url: String,
    /// Posts requested per page.
    #[serde(default = "default_posts_per_page")]
    pub posts_per_page: u32,
    /// Timeout for one page of posts.
    #[serde(default = "default_posts_timeout_secs")]
    pub posts_timeout_secs: u64,
    /// Timeout for the full tag dump.
    #[serde(default = "default_tags_timeout_secs")]
    pub tags_timeout_secs: u64,
    /// User-Agent header sent to the catalog.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_remote_base_url() -> String {
    "https://konachan.net".to_string()
}

fn default_posts_per_page() -> u32 {
    100
}

fn default_posts_timeout_secs() -> u64 {
    30
}

fn default_tags_timeout_secs() -> u64 {
    120
}

fn default_user_agent() -> String {
    concat!("konakore/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_base_url(),
            posts_per_page: default_posts_per_page(),
            posts_timeout_secs: default_posts_timeout_secs(),
            tags_timeout_secs: default_tags_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl RemoteConfig {
    pub fn posts_timeout(&self) -> Duration {
        Duration::from_secs(self.posts_timeout_secs)
    }

    pub fn tags_timeout(&self) -> Duration {
        Duration::from_secs(self.tags_timeout_secs)
    }
}

/// Backfill worker configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackfillConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sleep after the first successful page.
    #[serde(default = "default_backfill_initial_interval_secs")]
    pub initial_interval_secs: u64,
    /// Ceiling for the doubling interval (default: 24 hours).
    #[serde(default = "default_backfill_max_interval_secs")]
    pub max_interval_secs: u64,
    /// Delay before retrying a page after a fetch error.
    #[serde(default = "default_backfill_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_backfill_initial_interval_secs() -> u64 {
    10
}

fn default_backfill_max_interval_secs() -> u64 {
    86_400
}

fn default_backfill_retry_interval_secs() -> u64 {
    60
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_interval_secs: default_backfill_initial_interval_secs(),
            max_interval_secs: default_backfill_max_interval_secs(),
            retry_interval_secs: default_backfill_retry_interval_secs(),
        }
    }
}

impl BackfillConfig {
    pub fn max_interval(&self) -> Duration {
        Duration::from_secs(self.max_interval_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

/// Recent-window refresh configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minutes between refreshes.
    #[serde(default = "default_recent_interval_minutes")]
    pub interval_minutes: u64,
    /// Pages in the rotating window.
    #[serde(default = "default_recent_page_window")]
    pub page_window: u32,
}

fn default_recent_interval_minutes() -> u64 {
    48
}

fn default_recent_page_window() -> u32 {
    30
}

impl Default for RecentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_recent_interval_minutes(),
            page_window: default_recent_page_window(),
        }
    }
}

impl RecentConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

/// Tag catalog sync configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TagSyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Days between full syncs.
    #[serde(default = "default_tag_period_days")]
    pub period_days: u64,
    /// Tags applied per batch.
    #[serde(default = "default_tag_batch_size")]
    pub batch_size: usize,
    /// Pause between batches in milliseconds.
    #[serde(default = "default_tag_batch_pause_ms")]
    pub batch_pause_ms: u64,
    /// Run once at startup unless the last sync is younger than the period.
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

fn default_tag_period_days() -> u64 {
    7
}

fn default_tag_batch_size() -> usize {
    1000
}

fn default_tag_batch_pause_ms() -> u64 {
    1000
}

impl Default for TagSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_days: default_tag_period_days(),
            batch_size: default_tag_batch_size(),
            batch_pause_ms: default_tag_batch_pause_ms(),
            run_on_startup: true,
        }
    }
}

impl TagSyncConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_days * 24 * 3600)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

/// Settings shared by the batch-draining workers (association, like migration).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchWorkerConfig {
    /// Rows fetched per batch.
    #[serde(default = "default_worker_batch_size")]
    pub batch_size: i64,
    /// Sleep after a batch that did work.
    #[serde(default = "default_worker_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Idle sleep growth per consecutive empty batch.
    #[serde(default = "default_worker_idle_step_secs")]
    pub idle_step_secs: u64,
    /// Idle sleep ceiling.
    #[serde(default = "default_worker_idle_max_secs")]
    pub idle_max_secs: u64,
}

fn default_worker_batch_size() -> i64 {
    100
}

fn default_worker_cooldown_secs() -> u64 {
    2
}

fn default_worker_idle_step_secs() -> u64 {
    30
}

fn default_worker_idle_max_secs() -> u64 {
    3600
}

impl Default for BatchWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_worker_batch_size(),
            cooldown_secs: default_worker_cooldown_secs(),
            idle_step_secs: default_worker_idle_step_secs(),
            idle_max_secs: default_worker_idle_max_secs(),
        }
    }
}

impl BatchWorkerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn idle_backoff(&self) -> crate::IdleBackoff {
        crate::IdleBackoff::new(
            Duration::from_secs(self.idle_step_secs),
            Duration::from_secs(self.idle_max_secs),
        )
    }

    pub fn validate(&self, section: &str) -> Result<(), String> {
        if self.batch_size <= 0 {
            return Err(format!("{section}.batch_size must be positive"));
        }
        if self.idle_step_secs == 0 {
            return Err(format!(
                "{section}.idle_step_secs cannot be 0 (an idle worker would spin)"
            ));
        }
        Ok(())
    }
}

/// Download daemon (aria2 JSON-RPC) configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// RPC endpoint; `http(s)://` or `ws(s)://`.
    #[serde(default = "default_daemon_url")]
    pub url: String,
    /// Shared secret, sent as `token:<secret>`.
    #[serde(default)]
    pub secret: Option<String>,
    /// Timeout for one RPC call.
    #[serde(default = "default_daemon_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_daemon_url() -> String {
    "http://localhost:6800/jsonrpc".to_string()
}

fn default_daemon_timeout_secs() -> u64 {
    10
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            url: default_daemon_url(),
            secret: None,
            timeout_secs: default_daemon_timeout_secs(),
        }
    }
}

impl DaemonConfig {
    /// The configured secret, treating an empty value as unset.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Local image library configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Root directory holding the bucket subdirectories.
    #[serde(default = "default_library_root")]
    pub root: PathBuf,
    /// Posts per bucket directory.
    #[serde(default = "default_bucket_size")]
    pub bucket_size: i64,
    /// Tag text budget in generated file names.
    #[serde(default = "default_max_tags_len")]
    pub max_tags_len: usize,
}

fn default_library_root() -> PathBuf {
    PathBuf::from("/wallpaper")
}

fn default_bucket_size() -> i64 {
    crate::DEFAULT_BUCKET_SIZE
}

fn default_max_tags_len() -> usize {
    200
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_library_root(),
            bucket_size: default_bucket_size(),
            max_tags_len: default_max_tags_len(),
        }
    }
}

/// File sync orchestrator and listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileSyncConfig {
    /// Listener bind address.
    #[serde(default = "default_file_sync_bind")]
    pub bind: String,
    /// Liked posts examined per discovery pass.
    #[serde(default = "default_worker_batch_size")]
    pub batch_size: i64,
    /// Timeout for the URL existence probe.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Consecutive idle cycles before the loop stops itself.
    #[serde(default = "default_max_idle_cycles")]
    pub max_idle_cycles: u32,
    /// Inter-cycle delays by idle tier, in seconds.
    #[serde(default = "default_idle_tiers_secs")]
    pub idle_tiers_secs: Vec<u64>,
    /// Run a deep filesystem reconciliation every N cycles (0 disables).
    #[serde(default = "default_deep_reconcile_every")]
    pub deep_reconcile_every: u32,
    /// Start the loop once when the listener boots.
    #[serde(default = "default_true")]
    pub start_on_boot: bool,
    /// Expose /metrics.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_file_sync_bind() -> String {
    "0.0.0.0:8090".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_max_idle_cycles() -> u32 {
    10
}

fn default_idle_tiers_secs() -> Vec<u64> {
    vec![30, 60, 120, 180]
}

fn default_deep_reconcile_every() -> u32 {
    10
}

impl Default for FileSyncConfig {
    fn default() -> Self {
        Self {
            bind: default_file_sync_bind(),
            batch_size: default_worker_batch_size(),
            probe_timeout_secs: default_probe_timeout_secs(),
            max_idle_cycles: default_max_idle_cycles(),
            idle_tiers_secs: default_idle_tiers_secs(),
            deep_reconcile_every: default_deep_reconcile_every(),
            start_on_boot: true,
            metrics_enabled: true,
        }
    }
}

impl FileSyncConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn idle_tiers(&self) -> crate::IdleTiers {
        crate::IdleTiers::from_secs(&self.idle_tiers_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size <= 0 {
            return Err("file_sync.batch_size must be positive".to_string());
        }
        if self.max_idle_cycles == 0 {
            return Err("file_sync.max_idle_cycles must be at least 1".to_string());
        }
        if self.idle_tiers_secs.is_empty() {
            return Err("file_sync.idle_tiers_secs cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Outbound notification to the file sync listener.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Base URL of the file sync listener.
    #[serde(default = "default_file_sync_url")]
    pub file_sync_url: String,
    #[serde(default = "default_notifier_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_file_sync_url() -> String {
    "http://file_sync:8090".to_string()
}

fn default_notifier_timeout_secs() -> u64 {
    5
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            file_sync_url: default_file_sync_url(),
            timeout_secs: default_notifier_timeout_secs(),
        }
    }
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub recent: RecentConfig,
    #[serde(default)]
    pub tags: TagSyncConfig,
    #[serde(default)]
    pub post_tags: BatchWorkerConfig,
    #[serde(default)]
    pub likes: BatchWorkerConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub file_sync: FileSyncConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

impl AppConfig {
    /// Create a test configuration.
    ///
    /// **For testing only.** Points the library at `library_root` and shrinks
    /// every pause so loops can be driven quickly.
    pub fn for_testing(library_root: impl Into<PathBuf>) -> Self {
        let fast_worker = BatchWorkerConfig {
            batch_size: 100,
            cooldown_secs: 0,
            idle_step_secs: 1,
            idle_max_secs: 1,
        };
        Self {
            tags: TagSyncConfig {
                batch_pause_ms: 0,
                ..TagSyncConfig::default()
            },
            post_tags: fast_worker.clone(),
            likes: fast_worker,
            library: LibraryConfig {
                root: library_root.into(),
                ..LibraryConfig::default()
            },
            file_sync: FileSyncConfig {
                bind: "127.0.0.1:0".to_string(),
                start_on_boot: false,
                ..FileSyncConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.database.validate()?;
        self.post_tags.validate("post_tags")?;
        self.likes.validate("likes")?;
        self.file_sync.validate()?;
        if self.remote.posts_per_page == 0 {
            return Err("remote.posts_per_page must be at least 1".to_string());
        }
        if self.recent.page_window == 0 {
            return Err("recent.page_window must be at least 1".to_string());
        }
        if self.tags.batch_size == 0 {
            return Err("tags.batch_size must be at least 1".to_string());
        }
        if self.library.bucket_size <= 0 {
            return Err("library.bucket_size must be positive".to_string());
        }
        Ok(())
    }
}
