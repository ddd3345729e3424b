//! Post repository.

use crate::error::MetadataResult;
use crate::models::{NewPost, PostCounts, PostRow, UpsertReport};
use async_trait::async_trait;
use std::collections::HashMap;

/// Repository for ingested posts.
#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Upsert posts by remote id.
    ///
    /// On conflict the payload is replaced, `last_synced_at` refreshed and
    /// `is_processed` reset, even when the payload did not change.
    ///
    /// Rows are written one at a time. A row the database refuses is listed in
    /// the report and skipped; only connection-level failures return `Err`.
    async fn upsert_posts(&self, posts: &[NewPost]) -> MetadataResult<UpsertReport>;

    /// Get a post by id.
    async fn get_post(&self, id: i64) -> MetadataResult<Option<PostRow>>;

    /// Unprocessed posts with `id > after_id`, ascending by id.
    async fn get_unprocessed_posts(&self, after_id: i64, limit: i64)
    -> MetadataResult<Vec<PostRow>>;

    /// The subset of `ids` that exist.
    async fn existing_post_ids(&self, ids: &[i64]) -> MetadataResult<Vec<i64>>;

    /// Set the liked flag. Returns false when the post does not exist.
    async fn set_post_liked(&self, id: i64, liked: bool) -> MetadataResult<bool>;

    /// Liked flag for each of `ids` that exists. Missing posts are absent from the map.
    async fn liked_status(&self, ids: &[i64]) -> MetadataResult<HashMap<i64, bool>>;

    /// Total, processed and liked post counts.
    async fn post_counts(&self) -> MetadataResult<PostCounts>;
}
