//! Association builder: turns post payload tag lists into post/tag edges.

use super::{BatchOutcome, sleep_or_cancel};
use crate::error::JobResult;
use crate::lock;
use konakore_core::config::BatchWorkerConfig;
use konakore_core::{JobName, PostPayload};
use konakore_metadata::MetadataStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct PostTagBuilder {
    store: Arc<dyn MetadataStore>,
    config: BatchWorkerConfig,
    cursor: i64,
}

impl PostTagBuilder {
    pub fn new(store: Arc<dyn MetadataStore>, config: BatchWorkerConfig) -> Self {
        Self {
            store,
            config,
            cursor: 0,
        }
    }

    /// Process the next batch of unprocessed posts in ascending id order.
    ///
    /// A post is marked processed only when every tag name in its payload
    /// resolves and all edges are written. Posts without tags and posts with
    /// unknown tags are skipped and picked up again on a later scan.
    pub async fn run_batch(&mut self) -> JobResult<BatchOutcome> {
        let limit = self.config.batch_size;
        let posts = self.store.get_unprocessed_posts(self.cursor, limit).await?;
        let mut outcome = BatchOutcome {
            fetched: posts.len(),
            wrapped: (posts.len() as i64) < limit,
            ..Default::default()
        };

        match posts.last() {
            Some(last) if !outcome.wrapped => self.cursor = last.id,
            _ => self.cursor = 0,
        }
        if posts.is_empty() {
            return Ok(outcome);
        }

        let tagged: Vec<(i64, Vec<String>)> = posts
            .iter()
            .map(|post| (post.id, PostPayload::from_raw(&post.raw_data).tag_names()))
            .collect();

        let mut seen = HashSet::new();
        let names: Vec<String> = tagged
            .iter()
            .flat_map(|(_, names)| names.iter())
            .filter(|name| seen.insert(*name))
            .cloned()
            .collect();
        if names.is_empty() {
            outcome.deferred = posts.len();
            return Ok(outcome);
        }

        let resolved = self.store.resolve_tag_names(&names).await?;

        for (post_id, tag_names) in &tagged {
            if tag_names.is_empty() {
                outcome.deferred += 1;
                continue;
            }
            let ids: Option<Vec<i64>> = tag_names
                .iter()
                .map(|name| resolved.get(name).copied())
                .collect();
            let Some(mut ids) = ids else {
                debug!(post_id, "post references unknown tags, leaving for later");
                outcome.deferred += 1;
                continue;
            };
            ids.sort_unstable();
            ids.dedup();

            match self.store.link_post_tags(*post_id, &ids).await {
                Ok(()) => outcome.processed += 1,
                Err(e) => {
                    warn!(post_id, error = %e, "failed to link post tags");
                    outcome.deferred += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Run batches until cancelled, backing off while there is nothing to do.
    pub async fn run(mut self, cancel: CancellationToken) -> JobResult<()> {
        let Some(job_lock) = lock::acquire(self.store.as_ref(), JobName::PostTags).await? else {
            return Ok(());
        };
        info!("post tag association started");

        let backoff = self.config.idle_backoff();
        let mut idle: u32 = 0;
        loop {
            let delay = match self.run_batch().await {
                Ok(outcome) if outcome.processed > 0 => {
                    idle = 0;
                    info!(
                        processed = outcome.processed,
                        deferred = outcome.deferred,
                        "post tag batch done"
                    );
                    self.config.cooldown()
                }
                Ok(outcome) if !outcome.wrapped => self.config.cooldown(),
                Ok(_) => {
                    idle = idle.saturating_add(1);
                    let delay = backoff.delay(idle);
                    debug!(idle, sleep_secs = delay.as_secs(), "post tag batch idle");
                    delay
                }
                Err(e) => {
                    idle = idle.saturating_add(1);
                    let delay = backoff.delay(idle);
                    warn!(error = %e, sleep_secs = delay.as_secs(), "post tag batch failed");
                    delay
                }
            };

            if !sleep_or_cancel(delay, &cancel).await {
                break;
            }
        }

        lock::release(job_lock).await;
        info!("post tag association stopped");
        Ok(())
    }
}
