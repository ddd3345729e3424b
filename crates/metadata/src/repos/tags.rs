//! Tag catalog repository.

use crate::error::MetadataResult;
use crate::models::TagRow;
use async_trait::async_trait;
use konakore_core::RemoteTag;
use std::collections::HashMap;

/// Repository for the tag catalog.
#[async_trait]
pub trait TagRepo: Send + Sync {
    /// Existing tags among `ids`.
    async fn get_tags_by_ids(&self, ids: &[i64]) -> MetadataResult<Vec<TagRow>>;

    /// Insert a tag that is not yet in the catalog.
    async fn insert_tag(&self, tag: &RemoteTag) -> MetadataResult<()>;

    /// Overwrite name, count, type and ambiguity of an existing tag.
    async fn update_tag(&self, tag: &RemoteTag) -> MetadataResult<()>;

    /// Map each known name in `names` to its tag id. Unknown names are absent.
    async fn resolve_tag_names(&self, names: &[String]) -> MetadataResult<HashMap<String, i64>>;

    /// Number of tags in the catalog.
    async fn count_tags(&self) -> MetadataResult<i64>;
}
