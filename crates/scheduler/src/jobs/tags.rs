//! Full tag catalog sync.

use super::sleep_or_cancel;
use crate::error::JobResult;
use konakore_core::config::TagSyncConfig;
use konakore_core::{JobName, RemoteTag, TagSyncState};
use konakore_metadata::models::TagRow;
use konakore_metadata::{MetadataStore, load_job_state, save_job_state};
use konakore_remote::CatalogClient;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a batch of remote tags needs applied.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TagDiff<'a> {
    pub inserts: Vec<&'a RemoteTag>,
    pub updates: Vec<&'a RemoteTag>,
}

/// Compare remote tags against the stored rows with the same ids.
pub fn diff_tags<'a>(remote: &'a [RemoteTag], existing: &HashMap<i64, TagRow>) -> TagDiff<'a> {
    let mut diff = TagDiff::default();
    for tag in remote {
        match existing.get(&tag.id) {
            None => diff.inserts.push(tag),
            Some(row) if tag_changed(row, tag) => diff.updates.push(tag),
            Some(_) => {}
        }
    }
    diff
}

fn tag_changed(row: &TagRow, tag: &RemoteTag) -> bool {
    row.name != tag.name
        || row.count != tag.count
        || row.tag_type != tag.tag_type
        || row.ambiguous != tag.ambiguous
}

/// Counters from one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagSyncSummary {
    pub total: u64,
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
}

pub struct TagSyncWorker {
    store: Arc<dyn MetadataStore>,
    catalog: CatalogClient,
    config: TagSyncConfig,
}

impl TagSyncWorker {
    pub fn new(store: Arc<dyn MetadataStore>, catalog: CatalogClient, config: TagSyncConfig) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Whether a startup run is due: the last completed run is older than the
    /// period, or there never was one.
    pub async fn due_on_startup(&self) -> JobResult<bool> {
        let state: Option<TagSyncState> = load_job_state(self.store.as_ref(), JobName::TagSync).await?;
        let fresh = state.is_some_and(|s| s.is_fresh(OffsetDateTime::now_utc(), self.config.period()));
        Ok(!fresh)
    }

    /// Apply remote tags in batches, pausing between batches.
    ///
    /// A tag that fails to write is counted and skipped. A failure to read the
    /// existing rows of a batch aborts the run.
    pub async fn apply(
        &self,
        tags: &[RemoteTag],
        cancel: &CancellationToken,
    ) -> JobResult<TagSyncSummary> {
        let mut summary = TagSyncSummary {
            total: tags.len() as u64,
            ..Default::default()
        };
        let batch_size = self.config.batch_size.max(1);
        let batches = tags.len().div_ceil(batch_size);

        for (index, batch) in tags.chunks(batch_size).enumerate() {
            let ids: Vec<i64> = batch.iter().map(|t| t.id).collect();
            let existing: HashMap<i64, TagRow> = self
                .store
                .get_tags_by_ids(&ids)
                .await?
                .into_iter()
                .map(|row| (row.id, row))
                .collect();

            let diff = diff_tags(batch, &existing);
            for tag in diff.inserts {
                match self.store.insert_tag(tag).await {
                    Ok(()) => summary.inserted += 1,
                    Err(e) => {
                        summary.failed += 1;
                        warn!(tag_id = tag.id, name = %tag.name, error = %e, "tag insert failed");
                    }
                }
            }
            for tag in diff.updates {
                match self.store.update_tag(tag).await {
                    Ok(()) => summary.updated += 1,
                    Err(e) => {
                        summary.failed += 1;
                        warn!(tag_id = tag.id, name = %tag.name, error = %e, "tag update failed");
                    }
                }
            }
            debug!(batch = index + 1, batches, "tag batch applied");

            if index + 1 < batches && !sleep_or_cancel(self.config.batch_pause(), cancel).await {
                break;
            }
        }

        Ok(summary)
    }

    /// Fetch the whole vocabulary, apply it, and record the run.
    pub async fn run_once(&self, cancel: &CancellationToken) -> JobResult<TagSyncSummary> {
        let tags = self.catalog.fetch_tags().await?;
        info!(count = tags.len(), "fetched remote tag catalog");

        let summary = self.apply(&tags, cancel).await?;
        let state = TagSyncState {
            last_sync_count: summary.total,
            last_sync_new: summary.inserted,
            last_sync_updated: summary.updated,
            last_completed_at: Some(OffsetDateTime::now_utc()),
        };
        save_job_state(self.store.as_ref(), JobName::TagSync, &state).await?;

        info!(
            total = summary.total,
            inserted = summary.inserted,
            updated = summary.updated,
            failed = summary.failed,
            "tag sync completed"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(id: i64, name: &str, count: i64) -> RemoteTag {
        RemoteTag {
            id,
            name: name.to_string(),
            count,
            tag_type: 0,
            ambiguous: false,
        }
    }

    fn row(id: i64, name: &str, count: i64) -> TagRow {
        TagRow {
            id,
            name: name.to_string(),
            count,
            tag_type: 0,
            ambiguous: false,
            last_synced_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn new_changed_and_unchanged_tags_are_split() {
        let remote_tags = vec![remote(1, "sky", 10), remote(2, "sea", 5), remote(3, "new", 1)];
        let existing: HashMap<i64, TagRow> = [(1, row(1, "sky", 10)), (2, row(2, "sea", 4))]
            .into_iter()
            .collect();

        let diff = diff_tags(&remote_tags, &existing);
        assert_eq!(diff.inserts.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3]);
        assert_eq!(diff.updates.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn type_and_ambiguity_changes_count_as_updates() {
        let mut retyped = remote(1, "sky", 10);
        retyped.tag_type = 4;
        let mut ambiguous = remote(2, "sea", 5);
        ambiguous.ambiguous = true;
        let existing: HashMap<i64, TagRow> = [(1, row(1, "sky", 10)), (2, row(2, "sea", 5))]
            .into_iter()
            .collect();

        let tags = [retyped, ambiguous];
        let diff = diff_tags(&tags, &existing);
        assert!(diff.inserts.is_empty());
        assert_eq!(diff.updates.len(), 2);
    }
}
