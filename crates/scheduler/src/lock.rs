//! Named job locks.

use crate::error::JobResult;
use konakore_core::JobName;
use konakore_metadata::{JobLock, MetadataStore};
use tracing::{info, warn};

/// Try to become the single owner of `job`.
///
/// `None` means another session holds the lock. Callers exit quietly in that
/// case instead of retrying.
pub async fn acquire(store: &dyn MetadataStore, job: JobName) -> JobResult<Option<JobLock>> {
    let lock = store.try_acquire_lock(job.as_str()).await?;
    if lock.is_none() {
        info!(job = %job, "another instance holds the lock, skipping");
    }
    Ok(lock)
}

/// Release a lock, logging instead of failing.
pub async fn release(lock: JobLock) {
    let name = lock.name().to_string();
    if let Err(e) = lock.release().await {
        warn!(job = %name, error = %e, "failed to release job lock");
    }
}
