//! Deep reconciliation of the library tree against liked status.
//!
//! Catches files the entry-driven path never saw: files copied in by hand,
//! files that predate the entries table, or leftovers from a lost entry.

use crate::error::SyncResult;
use crate::metrics;
use konakore_metadata::MetadataStore;
use konakore_storage::Library;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Post ids looked up per liked-status query.
const LOOKUP_CHUNK: usize = 1000;

/// Counters from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub scanned: u64,
    pub removed: u64,
    pub failed: u64,
}

/// Remove every library file whose post is unliked or unknown.
///
/// Liked status is fully resolved before anything is deleted. If any lookup
/// fails the pass aborts with the error and the tree is left untouched.
pub async fn reconcile_library(store: &dyn MetadataStore, library: &Library) -> SyncResult<ReconcileStats> {
    let files = library.scan().await?;
    let mut stats = ReconcileStats {
        scanned: files.len() as u64,
        ..Default::default()
    };
    if files.is_empty() {
        debug!("library is empty, nothing to reconcile");
        return Ok(stats);
    }

    let mut ids: Vec<i64> = files.iter().map(|f| f.post_id).collect();
    ids.sort_unstable();
    ids.dedup();

    let mut liked: HashMap<i64, bool> = HashMap::with_capacity(ids.len());
    for chunk in ids.chunks(LOOKUP_CHUNK) {
        liked.extend(store.liked_status(chunk).await?);
    }

    for file in files {
        if liked.get(&file.post_id).copied().unwrap_or(false) {
            continue;
        }
        match library.remove(&file.path).await {
            Ok(_) => {
                debug!(post_id = file.post_id, path = %file.path.display(), "removed unliked file");
                stats.removed += 1;
            }
            Err(e) => {
                warn!(post_id = file.post_id, path = %file.path.display(), error = %e, "failed to remove file");
                stats.failed += 1;
            }
        }
    }

    metrics::RECONCILE_REMOVED.inc_by(stats.removed);
    info!(
        scanned = stats.scanned,
        removed = stats.removed,
        failed = stats.failed,
        "deep reconciliation finished"
    );
    Ok(stats)
}
