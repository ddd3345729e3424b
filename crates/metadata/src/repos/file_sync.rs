//! File sync entry repository.

use crate::error::MetadataResult;
use crate::models::{FileSyncRow, NewFileSync, PostRow};
use async_trait::async_trait;

/// Repository for file sync entries.
#[async_trait]
pub trait FileSyncRepo: Send + Sync {
    /// Liked posts with no live (non-DELETED) entry, newest first.
    async fn liked_posts_without_file(&self, limit: i64) -> MetadataResult<Vec<PostRow>>;

    /// Insert an entry and return its id.
    ///
    /// Fails with [`crate::MetadataError::Constraint`] when the post already
    /// has a live entry.
    async fn create_file_sync(&self, entry: &NewFileSync) -> MetadataResult<i64>;

    /// All entries still downloading.
    async fn get_downloading_entries(&self) -> MetadataResult<Vec<FileSyncRow>>;

    /// DOWNLOADING -> COMPLETE with the observed size. False if the entry was not downloading.
    async fn mark_file_sync_complete(&self, id: i64, actual_size: i64) -> MetadataResult<bool>;

    /// COMPLETE, not yet deleted entries whose post is no longer liked.
    async fn get_reclaimable_entries(&self) -> MetadataResult<Vec<FileSyncRow>>;

    /// COMPLETE -> DELETED. False if the entry was not complete.
    async fn mark_file_sync_deleted(&self, id: i64) -> MetadataResult<bool>;

    /// Every entry for a post, oldest first.
    async fn get_file_sync_entries(&self, post_id: i64) -> MetadataResult<Vec<FileSyncRow>>;

    /// Entry counts per status.
    async fn file_sync_counts(&self) -> MetadataResult<Vec<(String, i64)>>;
}
