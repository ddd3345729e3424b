//! Post to tag association repository.

use crate::error::MetadataResult;
use async_trait::async_trait;

/// Repository for association edges.
#[async_trait]
pub trait PostTagRepo: Send + Sync {
    /// Insert the edges for a post and mark it processed, in one transaction.
    ///
    /// Existing edges are left alone. If any insert fails nothing is written
    /// and the post stays unprocessed.
    async fn link_post_tags(&self, post_id: i64, tag_ids: &[i64]) -> MetadataResult<()>;

    /// Tag ids linked to a post, ascending.
    async fn get_post_tag_ids(&self, post_id: i64) -> MetadataResult<Vec<i64>>;

    /// Total number of edges.
    async fn count_post_tags(&self) -> MetadataResult<i64>;
}
