//! Drains the legacy likes table into `posts.is_liked`.

use super::{BatchOutcome, sleep_or_cancel};
use crate::error::JobResult;
use crate::lock;
use konakore_core::JobName;
use konakore_core::config::BatchWorkerConfig;
use konakore_metadata::MetadataStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct LikeMigration {
    store: Arc<dyn MetadataStore>,
    config: BatchWorkerConfig,
    cursor: Option<i64>,
}

impl LikeMigration {
    pub fn new(store: Arc<dyn MetadataStore>, config: BatchWorkerConfig) -> Self {
        Self {
            store,
            config,
            cursor: None,
        }
    }

    /// Migrate the next batch of markers, newest first.
    ///
    /// Markers whose post has not been synced yet stay in place. A marker that
    /// fails to migrate is skipped without affecting the rest of the batch.
    pub async fn run_batch(&mut self) -> JobResult<BatchOutcome> {
        let limit = self.config.batch_size;
        let markers = self.store.get_legacy_likes(self.cursor, limit).await?;
        let mut outcome = BatchOutcome {
            fetched: markers.len(),
            wrapped: (markers.len() as i64) < limit,
            ..Default::default()
        };

        self.cursor = match markers.last() {
            Some(last) if !outcome.wrapped => Some(*last),
            _ => None,
        };
        if markers.is_empty() {
            return Ok(outcome);
        }

        let existing: HashSet<i64> = self
            .store
            .existing_post_ids(&markers)
            .await?
            .into_iter()
            .collect();

        for id in markers {
            if !existing.contains(&id) {
                outcome.deferred += 1;
                continue;
            }
            match self.store.migrate_legacy_like(id).await {
                Ok(true) => outcome.processed += 1,
                Ok(false) => outcome.deferred += 1,
                Err(e) => {
                    warn!(post_id = id, error = %e, "failed to migrate legacy like");
                    outcome.deferred += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Run batches until cancelled, backing off while there is nothing to do.
    pub async fn run(mut self, cancel: CancellationToken) -> JobResult<()> {
        let Some(job_lock) = lock::acquire(self.store.as_ref(), JobName::LikeMigration).await? else {
            return Ok(());
        };
        info!("legacy like migration started");

        let backoff = self.config.idle_backoff();
        let mut idle: u32 = 0;
        loop {
            let delay = match self.run_batch().await {
                Ok(outcome) if outcome.processed > 0 => {
                    idle = 0;
                    info!(migrated = outcome.processed, "legacy likes migrated");
                    self.config.cooldown()
                }
                Ok(outcome) if !outcome.wrapped => self.config.cooldown(),
                Ok(_) => {
                    idle = idle.saturating_add(1);
                    let delay = backoff.delay(idle);
                    debug!(idle, sleep_secs = delay.as_secs(), "legacy like batch idle");
                    delay
                }
                Err(e) => {
                    idle = idle.saturating_add(1);
                    let delay = backoff.delay(idle);
                    warn!(error = %e, sleep_secs = delay.as_secs(), "legacy like batch failed");
                    delay
                }
            };

            if !sleep_or_cancel(delay, &cancel).await {
                break;
            }
        }

        lock::release(job_lock).await;
        info!("legacy like migration stopped");
        Ok(())
    }
}
