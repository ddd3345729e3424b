//! Combined metadata store trait.

use crate::error::MetadataResult;
use crate::repos::{
    FileSyncRepo, JobStateRepo, LegacyLikeRepo, LockRepo, PostRepo, PostTagRepo, TagRepo,
};
use async_trait::async_trait;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    LockRepo
    + JobStateRepo
    + PostRepo
    + TagRepo
    + PostTagRepo
    + LegacyLikeRepo
    + FileSyncRepo
    + Send
    + Sync
{
    /// Apply the schema. Safe to run repeatedly.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> MetadataResult<()>;
}
