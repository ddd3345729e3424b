//! Error types for the sync loop and the HTTP listener.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use konakore_metadata::MetadataError;
use konakore_remote::RemoteError;
use konakore_storage::StorageError;
use serde::Serialize;

/// Failure of a sync step.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
