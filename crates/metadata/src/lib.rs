//! Metadata store abstraction and implementations for konakore.
//!
//! This crate owns every table the workers share:
//! - Posts and their raw catalog payloads
//! - The tag catalog and post to tag edges
//! - Legacy like markers awaiting migration
//! - File sync entries
//! - Per-job progress blobs and advisory job locks

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use repos::job_state::{load_job_state, save_job_state};
pub use repos::{JobLock, LockHandle};
pub use store::MetadataStore;

use konakore_core::config::DatabaseConfig;
use std::sync::Arc;

/// Connect to PostgreSQL with startup retries and apply the schema.
pub async fn from_config(config: &DatabaseConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    config.validate().map_err(MetadataError::Config)?;
    let store = PostgresStore::connect_with_retry(config).await?;
    Ok(Arc::new(store) as Arc<dyn MetadataStore>)
}
