//! Remote client error types.

use thiserror::Error;

/// Errors from outbound calls.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RemoteError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RemoteError::WebSocket(err.to_string())
    }
}

/// Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Send a request and turn timeouts and non-success statuses into errors.
pub(crate) async fn send_checked(req: reqwest::RequestBuilder) -> RemoteResult<reqwest::Response> {
    let response = req.send().await.map_err(|e| {
        if e.is_timeout() {
            RemoteError::Timeout(
                e.url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "request".to_string()),
            )
        } else {
            RemoteError::Http(e)
        }
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(RemoteError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response)
}
