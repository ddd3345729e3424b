//! Download URL existence probe.

use crate::error::{RemoteError, RemoteResult, send_checked};
use std::time::Duration;
use tracing::{debug, warn};

/// Issues `HEAD` requests, following redirects, and requires a 200.
#[derive(Clone, Debug)]
pub struct UrlProbe {
    http: reqwest::Client,
    timeout: Duration,
}

impl UrlProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }

    /// `Content-Length` of the resource, if the server reported one.
    pub async fn head(&self, url: &str) -> RemoteResult<Option<u64>> {
        let response = send_checked(self.http.head(url).timeout(self.timeout)).await?;
        // Partial or empty answers do not count as a downloadable file.
        if response.status() != reqwest::StatusCode::OK {
            return Err(RemoteError::Status {
                status: response.status().as_u16(),
                url: response.url().to_string(),
            });
        }
        let length = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        Ok(length)
    }

    /// Whether the URL currently answers with 200. Failures are logged.
    pub async fn is_reachable(&self, url: &str) -> bool {
        match self.head(url).await {
            Ok(length) => {
                debug!(url, ?length, "download URL reachable");
                true
            }
            Err(e) => {
                warn!(url, error = %e, "download URL failed validation");
                false
            }
        }
    }
}
