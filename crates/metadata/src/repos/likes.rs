//! Legacy like marker repository.

use crate::error::MetadataResult;
use async_trait::async_trait;

/// Repository for the deprecated `likes` table.
#[async_trait]
pub trait LegacyLikeRepo: Send + Sync {
    /// Marker ids below `before_id` (all when `None`), descending.
    async fn get_legacy_likes(&self, before_id: Option<i64>, limit: i64)
    -> MetadataResult<Vec<i64>>;

    /// Record a legacy marker.
    async fn insert_legacy_like(&self, id: i64) -> MetadataResult<()>;

    /// Set the post's liked flag and, if a row was updated, delete the marker.
    ///
    /// Both happen in one transaction. Returns false when no post was updated;
    /// the marker is then kept.
    async fn migrate_legacy_like(&self, id: i64) -> MetadataResult<bool>;
}
