//! Worker error types.

use konakore_metadata::MetadataError;
use konakore_remote::RemoteError;
use thiserror::Error;

/// Errors that stop a worker step.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// Result type for worker operations.
pub type JobResult<T> = std::result::Result<T, JobError>;
