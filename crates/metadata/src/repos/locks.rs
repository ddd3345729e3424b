//! Named, session-scoped job locks.
//!
//! A lock lives exactly as long as the database session that took it. Losing
//! the session (process crash, dropped connection) releases it, so a new
//! instance can take over without manual cleanup.

use crate::error::MetadataResult;
use async_trait::async_trait;
use std::fmt;

/// Backend-specific ownership of an acquired lock.
#[async_trait]
pub trait LockHandle: Send {
    /// Release the lock and end its session.
    async fn release(self: Box<Self>) -> MetadataResult<()>;
}

/// An acquired job lock. Dropping it without calling [`JobLock::release`]
/// still frees the lock once the owning session ends.
pub struct JobLock {
    name: String,
    handle: Box<dyn LockHandle>,
}

impl JobLock {
    pub fn new(name: impl Into<String>, handle: Box<dyn LockHandle>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn release(self) -> MetadataResult<()> {
        let name = self.name;
        self.handle.release().await?;
        tracing::debug!(lock = %name, "Released job lock");
        Ok(())
    }
}

impl fmt::Debug for JobLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobLock").field("name", &self.name).finish()
    }
}

/// Repository for job locks.
#[async_trait]
pub trait LockRepo: Send + Sync {
    /// Try to take the named lock without waiting.
    ///
    /// Returns `None` when another session already holds it. Callers that get
    /// `None` should exit rather than retry.
    async fn try_acquire_lock(&self, name: &str) -> MetadataResult<Option<JobLock>>;
}
