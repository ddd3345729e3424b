//! One file sync cycle and the adaptive loop around it.
//!
//! A cycle runs four steps in order:
//!
//! 1. discovery of liked posts without a live entry, adopting files already
//!    in the library and submitting the rest to the download daemon
//! 2. completion checks for entries still downloading
//! 3. reclamation of completed files whose post was unliked
//! 4. every few cycles, a deep reconciliation of the library tree
//!
//! Step failures are logged and counted as no activity; the loop carries on.

use crate::error::SyncResult;
use crate::metrics;
use crate::reconcile::{ReconcileStats, reconcile_library};
use konakore_core::config::FileSyncConfig;
use konakore_core::{FileSyncStatus, IdleTiers, JobName, PostPayload};
use konakore_metadata::models::{NewFileSync, PostRow};
use konakore_metadata::MetadataStore;
use konakore_remote::{AddUriOptions, DaemonClient, UrlProbe};
use konakore_storage::{Library, LibraryFile};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Counters from one discovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub submitted: u64,
    pub adopted: u64,
    pub failed: u64,
}

/// Counters from one full cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub submitted: u64,
    pub adopted: u64,
    pub failed: u64,
    pub completed: u64,
    pub reclaimed: u64,
}

impl CycleStats {
    /// Entries created, completed or deleted. Failures do not count.
    pub fn activity(&self) -> u64 {
        self.submitted + self.adopted + self.completed + self.reclaimed
    }
}

/// How a loop run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Too many consecutive cycles without activity.
    Idle,
    /// Stop was requested.
    Cancelled,
    /// Another process owns the file sync lock.
    LockHeld,
}

/// Knobs for the adaptive loop.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_idle_cycles: u32,
    pub idle_tiers: IdleTiers,
    /// Run a deep reconciliation every this many cycles. Zero disables it.
    pub deep_reconcile_every: u32,
}

impl LoopSettings {
    pub fn from_config(config: &FileSyncConfig) -> Self {
        Self {
            max_idle_cycles: config.max_idle_cycles.max(1),
            idle_tiers: config.idle_tiers(),
            deep_reconcile_every: config.deep_reconcile_every,
        }
    }
}

enum Discovered {
    Submitted,
    Adopted,
    Skipped,
}

/// Mirrors liked posts into the library through the download daemon.
pub struct FileSync {
    store: Arc<dyn MetadataStore>,
    library: Library,
    daemon: DaemonClient,
    probe: UrlProbe,
    batch_size: i64,
}

impl FileSync {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        library: Library,
        daemon: DaemonClient,
        probe: UrlProbe,
        batch_size: i64,
    ) -> Self {
        Self {
            store,
            library,
            daemon,
            probe,
            batch_size: batch_size.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Create entries for liked posts that have none.
    ///
    /// A post whose file is already in the library gets a COMPLETE entry
    /// without touching the network. Per-post failures are counted and the
    /// post stays eligible for the next pass.
    pub async fn discover(&self) -> SyncResult<DiscoveryStats> {
        let posts = self.store.liked_posts_without_file(self.batch_size).await?;
        let mut stats = DiscoveryStats::default();
        if posts.is_empty() {
            debug!("no liked posts waiting for a file");
            return Ok(stats);
        }

        for post in &posts {
            match self.discover_post(post).await {
                Ok(Discovered::Submitted) => stats.submitted += 1,
                Ok(Discovered::Adopted) => stats.adopted += 1,
                Ok(Discovered::Skipped) => stats.failed += 1,
                Err(e) => {
                    warn!(post_id = post.id, error = %e, "file sync discovery failed for post");
                    stats.failed += 1;
                }
            }
        }

        metrics::DOWNLOADS_SUBMITTED.inc_by(stats.submitted);
        metrics::FILES_ADOPTED.inc_by(stats.adopted);
        metrics::DOWNLOADS_FAILED.inc_by(stats.failed);
        info!(
            submitted = stats.submitted,
            adopted = stats.adopted,
            failed = stats.failed,
            "liked post discovery finished"
        );
        Ok(stats)
    }

    async fn discover_post(&self, post: &PostRow) -> SyncResult<Discovered> {
        let payload = PostPayload::from_raw(&post.raw_data);
        if let Some(existing) = self.library.find_existing(post.id).await? {
            return self.adopt(post.id, &payload, existing).await;
        }
        self.submit(post.id, &payload).await
    }

    async fn adopt(
        &self,
        post_id: i64,
        payload: &PostPayload,
        file: LibraryFile,
    ) -> SyncResult<Discovered> {
        let (download_url, expected_size) = payload.adopted_source(&file.ext);
        let entry = NewFileSync {
            post_id,
            download_url,
            expected_size: Some(expected_size),
            actual_size: Some(file.size as i64),
            file_ext: file.ext.clone(),
            file_path: file.path.to_string_lossy().into_owned(),
            aria_log: None,
            status: FileSyncStatus::Complete,
        };
        if !self.record(&entry).await? {
            return Ok(Discovered::Skipped);
        }
        info!(post_id, path = %file.path.display(), "adopted existing library file");
        Ok(Discovered::Adopted)
    }

    #[instrument(skip(self, payload))]
    async fn submit(&self, post_id: i64, payload: &PostPayload) -> SyncResult<Discovered> {
        let Some(choice) = payload.select_download() else {
            warn!(post_id, "post has no download URL");
            return Ok(Discovered::Skipped);
        };
        if !self.probe.is_reachable(&choice.url).await {
            return Ok(Discovered::Skipped);
        }

        let dir = self.library.ensure_bucket(post_id).await?;
        let file_name = self
            .library
            .file_name_for(post_id, &payload.tag_names(), choice.ext);
        let options = AddUriOptions {
            dir: dir.to_string_lossy().into_owned(),
            out: file_name.clone(),
        };

        let submission = match self.daemon.add_uri(&choice.url, &options).await {
            Ok(submission) => submission,
            Err(e) => {
                warn!(post_id, url = %choice.url, error = %e, "download daemon rejected submission");
                return Ok(Discovered::Skipped);
            }
        };

        let entry = NewFileSync {
            post_id,
            download_url: Some(choice.url.clone()),
            expected_size: Some(choice.expected_size),
            actual_size: None,
            file_ext: choice.ext.to_string(),
            file_path: dir.join(&file_name).to_string_lossy().into_owned(),
            aria_log: Some(submission.audit),
            status: FileSyncStatus::Downloading,
        };
        if !self.record(&entry).await? {
            return Ok(Discovered::Skipped);
        }
        info!(post_id, gid = %submission.gid, file = %file_name, "download submitted");
        Ok(Discovered::Submitted)
    }

    /// Insert an entry. False when the post gained a live entry meanwhile.
    async fn record(&self, entry: &NewFileSync) -> SyncResult<bool> {
        match self.store.create_file_sync(entry).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_constraint() => {
                debug!(post_id = entry.post_id, "post already has a live file sync entry");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move downloading entries whose file has landed to COMPLETE.
    ///
    /// A file with a `.aria2` control file beside it is still being written.
    pub async fn check_downloads(&self) -> SyncResult<u64> {
        let entries = self.store.get_downloading_entries().await?;
        let mut completed = 0;

        for entry in entries {
            let size = match self.library.completed_size(Path::new(&entry.file_path)).await {
                Ok(Some(size)) => size,
                Ok(None) => continue,
                Err(e) => {
                    warn!(post_id = entry.post_id, path = %entry.file_path, error = %e, "could not stat download");
                    continue;
                }
            };
            match self.store.mark_file_sync_complete(entry.id, size as i64).await {
                Ok(true) => {
                    info!(post_id = entry.post_id, size, "download complete");
                    completed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(post_id = entry.post_id, error = %e, "failed to mark download complete");
                }
            }
        }

        metrics::DOWNLOADS_COMPLETED.inc_by(completed);
        Ok(completed)
    }

    /// Delete files of unliked posts and mark their entries DELETED.
    pub async fn reclaim(&self) -> SyncResult<u64> {
        let entries = self.store.get_reclaimable_entries().await?;
        let mut reclaimed = 0;

        for entry in entries {
            let path = Path::new(&entry.file_path);
            match self.library.remove(path).await {
                Ok(true) => debug!(post_id = entry.post_id, path = %entry.file_path, "removed file"),
                Ok(false) => debug!(post_id = entry.post_id, path = %entry.file_path, "file already gone"),
                Err(e) => {
                    warn!(post_id = entry.post_id, path = %entry.file_path, error = %e, "failed to remove file");
                    continue;
                }
            }
            match self.store.mark_file_sync_deleted(entry.id).await {
                Ok(true) => reclaimed += 1,
                Ok(false) => {}
                Err(e) => warn!(post_id = entry.post_id, error = %e, "failed to mark entry deleted"),
            }
        }

        if reclaimed > 0 {
            info!(reclaimed, "reclaimed files of unliked posts");
        }
        metrics::FILES_RECLAIMED.inc_by(reclaimed);
        Ok(reclaimed)
    }

    /// Run discovery, completion and reclamation once.
    pub async fn run_cycle(&self) -> CycleStats {
        let mut stats = CycleStats::default();

        match self.discover().await {
            Ok(found) => {
                stats.submitted = found.submitted;
                stats.adopted = found.adopted;
                stats.failed = found.failed;
            }
            Err(e) => error!(error = %e, "liked post discovery failed"),
        }
        match self.check_downloads().await {
            Ok(completed) => stats.completed = completed,
            Err(e) => error!(error = %e, "download status check failed"),
        }
        match self.reclaim().await {
            Ok(reclaimed) => stats.reclaimed = reclaimed,
            Err(e) => error!(error = %e, "reclamation failed"),
        }

        metrics::CYCLES_RUN.inc();
        stats
    }

    /// One deep reconciliation pass over the library tree.
    pub async fn reconcile(&self) -> SyncResult<ReconcileStats> {
        reconcile_library(self.store.as_ref(), &self.library).await
    }

    /// Cycle until idle for too long or cancelled.
    ///
    /// Holds the `file-sync` job lock for the whole run so two listeners
    /// sharing a database never drive the same downloads.
    pub async fn run_loop(&self, settings: &LoopSettings, cancel: &CancellationToken) -> SyncResult<LoopExit> {
        let Some(job_lock) = self.store.try_acquire_lock(JobName::FileSync.as_str()).await? else {
            info!("file sync lock held by another process, not starting");
            return Ok(LoopExit::LockHeld);
        };

        let exit = self.cycle_until_idle(settings, cancel).await;

        if let Err(e) = job_lock.release().await {
            warn!(error = %e, "failed to release file sync lock");
        }
        Ok(exit)
    }

    async fn cycle_until_idle(&self, settings: &LoopSettings, cancel: &CancellationToken) -> LoopExit {
        let mut idle: u32 = 0;
        let mut cycles: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return LoopExit::Cancelled;
            }

            cycles = cycles.wrapping_add(1);
            let stats = self.run_cycle().await;

            if settings.deep_reconcile_every > 0
                && cycles % settings.deep_reconcile_every == 0
                && let Err(e) = self.reconcile().await
            {
                error!(error = %e, "deep reconciliation failed");
            }

            if stats.activity() == 0 {
                idle += 1;
                info!(idle, max = settings.max_idle_cycles, "file sync cycle idle");
            } else {
                idle = 0;
                info!(
                    submitted = stats.submitted,
                    adopted = stats.adopted,
                    completed = stats.completed,
                    reclaimed = stats.reclaimed,
                    "file sync cycle found work"
                );
            }

            if idle >= settings.max_idle_cycles {
                info!(cycles, "no file sync activity, stopping loop");
                return LoopExit::Idle;
            }

            let delay = settings.idle_tiers.delay(idle);
            debug!(next_in_secs = delay.as_secs(), "file sync sleeping");
            if !sleep_or_cancel(delay, cancel).await {
                return LoopExit::Cancelled;
            }
        }
    }
}

/// Sleep for `duration`. False if cancelled first.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_are_not_activity() {
        let stats = CycleStats {
            failed: 5,
            ..Default::default()
        };
        assert_eq!(stats.activity(), 0);

        let stats = CycleStats {
            adopted: 1,
            reclaimed: 2,
            ..Default::default()
        };
        assert_eq!(stats.activity(), 3);
    }

    #[test]
    fn test_loop_settings_clamp_idle_cycles() {
        let config = FileSyncConfig {
            max_idle_cycles: 0,
            ..Default::default()
        };
        let settings = LoopSettings::from_config(&config);
        assert_eq!(settings.max_idle_cycles, 1);
        assert_eq!(settings.idle_tiers.delay(0), Duration::from_secs(30));
    }
}
