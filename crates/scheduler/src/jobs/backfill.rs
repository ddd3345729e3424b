//! Exhaustive historical ingestion, one page at a time.

use super::{ingest_page, sleep_or_cancel};
use crate::error::{JobError, JobResult};
use crate::lock;
use konakore_core::config::BackfillConfig;
use konakore_core::{BackfillState, DoublingInterval, JobName};
use konakore_metadata::{MetadataStore, load_job_state, save_job_state};
use konakore_remote::CatalogClient;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of one backfill step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillStep {
    /// Page stored and cursor advanced. Sleep `delay` before the next page.
    Advanced {
        page: u32,
        stored: usize,
        delay: Duration,
    },
    /// The remote returned an empty page; backfill is finished.
    Completed { page: u32 },
    /// Fetch failed; the same page is retried after `delay`.
    Retry {
        page: u32,
        delay: Duration,
        reason: String,
    },
}

pub struct BackfillWorker {
    store: Arc<dyn MetadataStore>,
    catalog: CatalogClient,
    config: BackfillConfig,
}

impl BackfillWorker {
    pub fn new(store: Arc<dyn MetadataStore>, catalog: CatalogClient, config: BackfillConfig) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Persisted state, or a fresh one starting at page 1.
    pub async fn load_state(&self) -> JobResult<BackfillState> {
        let state = load_job_state(self.store.as_ref(), JobName::Backfill).await?;
        Ok(state.unwrap_or_else(|| BackfillState::initial(self.config.initial_interval_secs)))
    }

    /// Process the page the state points at.
    ///
    /// The cursor only moves after the new state is written; a failed write is
    /// returned as an error and leaves `state` untouched in the store.
    pub async fn step(&self, state: &mut BackfillState) -> JobResult<BackfillStep> {
        let page = state.current_page;
        let ingested = match ingest_page(self.store.as_ref(), &self.catalog, page).await {
            Ok(ingested) => ingested,
            Err(JobError::Remote(e)) => {
                return Ok(BackfillStep::Retry {
                    page,
                    delay: self.config.retry_interval(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        if ingested.is_exhausted() {
            let mut next = state.clone();
            next.complete();
            save_job_state(self.store.as_ref(), JobName::Backfill, &next).await?;
            *state = next;
            return Ok(BackfillStep::Completed { page });
        }

        let delay = Duration::from_secs(state.interval_seconds);
        let doubled = DoublingInterval::new(self.config.max_interval()).next(delay);
        let mut next = state.clone();
        next.advance(doubled.as_secs());
        save_job_state(self.store.as_ref(), JobName::Backfill, &next).await?;
        *state = next;

        Ok(BackfillStep::Advanced {
            page,
            stored: ingested.stored,
            delay,
        })
    }

    /// Run until the catalog is exhausted or `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> JobResult<()> {
        let Some(job_lock) = lock::acquire(self.store.as_ref(), JobName::Backfill).await? else {
            return Ok(());
        };

        let result = self.run_locked(&cancel).await;
        lock::release(job_lock).await;
        result
    }

    async fn run_locked(&self, cancel: &CancellationToken) -> JobResult<()> {
        let mut state = self.load_state().await?;
        if state.is_completed() || !state.is_active {
            info!(page = state.current_page, "backfill already finished");
            return Ok(());
        }
        info!(page = state.current_page, "backfill starting");

        loop {
            let step = match self.step(&mut state).await {
                Ok(step) => step,
                Err(e) => {
                    error!(page = state.current_page, error = %e, "backfill stopped on store failure");
                    return Err(e);
                }
            };

            let delay = match step {
                BackfillStep::Advanced { page, stored, delay } => {
                    info!(page, stored, next_in_secs = delay.as_secs(), "backfill page synced");
                    delay
                }
                BackfillStep::Completed { page } => {
                    info!(page, "backfill complete");
                    return Ok(());
                }
                BackfillStep::Retry {
                    page,
                    delay,
                    reason,
                } => {
                    warn!(page, retry_in_secs = delay.as_secs(), error = %reason, "backfill fetch failed");
                    delay
                }
            };

            if !sleep_or_cancel(delay, cancel).await {
                info!(page = state.current_page, "backfill cancelled");
                return Ok(());
            }
        }
    }
}
