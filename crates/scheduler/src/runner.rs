//! Process runner: starts every worker and the periodic schedule.

use crate::error::{JobError, JobResult};
use crate::jobs::backfill::BackfillWorker;
use crate::jobs::likes::LikeMigration;
use crate::jobs::post_tags::PostTagBuilder;
use crate::jobs::recent::RecentRefresh;
use crate::jobs::tags::TagSyncWorker;
use crate::lock;
use konakore_core::JobName;
use konakore_core::config::AppConfig;
use konakore_metadata::MetadataStore;
use konakore_remote::CatalogClient;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run `task` under the job's lock. Returns `false` when another session
/// holds the lock and the run was skipped.
pub async fn run_guarded<Fut>(store: &dyn MetadataStore, job: JobName, task: Fut) -> bool
where
    Fut: Future<Output = JobResult<()>>,
{
    let job_lock = match lock::acquire(store, job).await {
        Ok(Some(job_lock)) => job_lock,
        Ok(None) => return false,
        Err(e) => {
            warn!(job = %job, error = %e, "could not take job lock");
            return false;
        }
    };

    if let Err(e) = task.await {
        warn!(job = %job, error = %e, "periodic job failed");
    }
    lock::release(job_lock).await;
    true
}

async fn run_periodic<F, Fut>(
    store: Arc<dyn MetadataStore>,
    job: JobName,
    period: Duration,
    run_immediately: bool,
    cancel: CancellationToken,
    mut task: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = JobResult<()>>,
{
    let period = period.max(Duration::from_secs(1));
    let start = if run_immediately {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(job = %job, period_secs = period.as_secs(), run_immediately, "periodic job scheduled");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        run_guarded(store.as_ref(), job, task()).await;
    }
}

pub struct Scheduler {
    store: Arc<dyn MetadataStore>,
    catalog: CatalogClient,
    config: Arc<AppConfig>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn MetadataStore>, catalog: CatalogClient, config: AppConfig) -> Self {
        Self {
            store,
            catalog,
            config: Arc::new(config),
        }
    }

    fn spawn_periodic(&self, set: &mut JoinSet<()>, shutdown: &CancellationToken) {
        let config = &self.config;

        if config.recent.enabled {
            let worker = Arc::new(RecentRefresh::new(
                self.store.clone(),
                self.catalog.clone(),
                config.recent.clone(),
            ));
            set.spawn(run_periodic(
                self.store.clone(),
                JobName::RecentRefresh,
                config.recent.interval(),
                false,
                shutdown.clone(),
                move || {
                    let worker = worker.clone();
                    async move { worker.run_once().await.map(|_| ()) }
                },
            ));
        }

        if config.tags.enabled {
            let worker = Arc::new(TagSyncWorker::new(
                self.store.clone(),
                self.catalog.clone(),
                config.tags.clone(),
            ));
            let store = self.store.clone();
            let period = config.tags.period();
            let run_on_startup = config.tags.run_on_startup;
            let cancel = shutdown.clone();
            set.spawn(async move {
                let run_now = run_on_startup
                    && match worker.due_on_startup().await {
                        Ok(due) => due,
                        Err(e) => {
                            warn!(error = %e, "could not read tag sync state, running anyway");
                            true
                        }
                    };
                if run_on_startup && !run_now {
                    info!("tag catalog synced recently, skipping startup run");
                }
                let task_cancel = cancel.clone();
                run_periodic(store, JobName::TagSync, period, run_now, cancel, move || {
                    let worker = worker.clone();
                    let cancel = task_cancel.clone();
                    async move { worker.run_once(&cancel).await.map(|_| ()) }
                })
                .await;
            });
        }
    }

    fn spawn_workers(&self, set: &mut JoinSet<(JobName, JobResult<()>)>, shutdown: &CancellationToken) {
        let config = &self.config;

        if config.backfill.enabled {
            let worker = BackfillWorker::new(
                self.store.clone(),
                self.catalog.clone(),
                config.backfill.clone(),
            );
            let cancel = shutdown.clone();
            set.spawn(async move { (JobName::Backfill, worker.run(cancel).await) });
        }

        let builder = PostTagBuilder::new(self.store.clone(), config.post_tags.clone());
        let cancel = shutdown.clone();
        set.spawn(async move { (JobName::PostTags, builder.run(cancel).await) });

        let migration = LikeMigration::new(self.store.clone(), config.likes.clone());
        let cancel = shutdown.clone();
        set.spawn(async move { (JobName::LikeMigration, migration.run(cancel).await) });
    }

    /// Start everything and wait for the long-running workers to finish.
    ///
    /// Periodic jobs keep running after that until `shutdown` fires. Returns
    /// the first worker error, if any.
    pub async fn run(self, shutdown: CancellationToken) -> JobResult<()> {
        let mut periodic = JoinSet::new();
        self.spawn_periodic(&mut periodic, &shutdown);

        let mut workers = JoinSet::new();
        self.spawn_workers(&mut workers, &shutdown);

        let mut first_error: Option<JobError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((job, Ok(()))) => info!(job = %job, "worker finished"),
                Ok((job, Err(e))) => {
                    error!(job = %job, error = %e, "worker failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => error!(error = %e, "worker task panicked"),
            }
        }

        if !periodic.is_empty() {
            info!("long-running workers done, periodic jobs continue until shutdown");
            shutdown.cancelled().await;
        }
        periodic.shutdown().await;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
