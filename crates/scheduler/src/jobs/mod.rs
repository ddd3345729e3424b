//! Worker implementations.

pub mod backfill;
pub mod likes;
pub mod post_tags;
pub mod recent;
pub mod tags;

use crate::error::JobResult;
use konakore_metadata::MetadataStore;
use konakore_metadata::models::NewPost;
use konakore_remote::CatalogClient;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Counters for one batch of an association or migration worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows read from the store.
    pub fetched: usize,
    /// Rows whose work was completed.
    pub processed: usize,
    /// Rows left for a later pass.
    pub deferred: usize,
    /// The batch reached the end of the candidate set and the scan restarts
    /// from the beginning next time.
    pub wrapped: bool,
}

/// Counts from one ingested catalog page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestedPage {
    pub fetched: usize,
    pub stored: usize,
    /// Records skipped because the store refused them.
    pub rejected: usize,
}

impl IngestedPage {
    /// The remote returned no records: the catalog ends before this page.
    pub fn is_exhausted(&self) -> bool {
        self.fetched == 0
    }
}

/// Fetch one catalog page and upsert every record on it.
///
/// Records the store refuses are skipped with a warning and the rest of the
/// page is kept. Fetch failures come back as `JobError::Remote`, store
/// failures that are not tied to one record as `JobError::Metadata`.
pub async fn ingest_page(
    store: &dyn MetadataStore,
    catalog: &CatalogClient,
    page: u32,
) -> JobResult<IngestedPage> {
    let raw = catalog.fetch_posts(page).await?;
    if raw.is_empty() {
        return Ok(IngestedPage::default());
    }

    let fetched = raw.len();
    let posts: Vec<NewPost> = raw.into_iter().filter_map(NewPost::from_raw).collect();
    if posts.len() < fetched {
        warn!(
            page,
            dropped = fetched - posts.len(),
            "catalog records without a numeric id were dropped"
        );
    }

    if posts.is_empty() {
        return Ok(IngestedPage {
            fetched,
            ..Default::default()
        });
    }

    let report = store.upsert_posts(&posts).await?;
    if !report.rejected.is_empty() {
        warn!(page, rejected = ?report.rejected, "catalog records refused by the store were skipped");
    }
    debug!(page, stored = report.stored, "page ingested");
    Ok(IngestedPage {
        fetched,
        stored: report.stored as usize,
        rejected: report.rejected.len(),
    })
}

/// Sleep unless cancelled first. Returns `false` on cancellation.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
