//! Job state repository.

use crate::error::MetadataResult;
use crate::models::JobStateRow;
use async_trait::async_trait;
use konakore_core::JobName;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Repository for per-job progress blobs.
#[async_trait]
pub trait JobStateRepo: Send + Sync {
    /// Get the state row for a job, if it was ever written.
    async fn get_job_state(&self, job_name: &str) -> MetadataResult<Option<JobStateRow>>;

    /// Replace a job's state and stamp `last_run_at`. Creates the row on first write.
    async fn set_job_state(&self, job_name: &str, state: &Value) -> MetadataResult<()>;

    /// All job state rows ordered by name.
    async fn list_job_states(&self) -> MetadataResult<Vec<JobStateRow>>;
}

/// Load a typed job state blob.
pub async fn load_job_state<T, R>(repo: &R, job: JobName) -> MetadataResult<Option<T>>
where
    T: DeserializeOwned,
    R: JobStateRepo + ?Sized,
{
    match repo.get_job_state(job.as_str()).await? {
        Some(row) => Ok(Some(serde_json::from_value(row.state)?)),
        None => Ok(None),
    }
}

/// Persist a typed job state blob.
pub async fn save_job_state<T, R>(repo: &R, job: JobName, state: &T) -> MetadataResult<()>
where
    T: Serialize + Sync,
    R: JobStateRepo + ?Sized,
{
    let value = serde_json::to_value(state)?;
    repo.set_job_state(job.as_str(), &value).await
}
