//! File-sync listener wire types and client.

use crate::error::{RemoteError, RemoteResult, send_checked};
use konakore_core::config::NotifierConfig;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Control actions accepted by `POST /trigger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerAction {
    #[default]
    Start,
    Stop,
    Status,
}

impl TriggerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerAction::Start => "start",
            TriggerAction::Stop => "stop",
            TriggerAction::Status => "status",
        }
    }
}

impl fmt::Display for TriggerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(TriggerAction::Start),
            "stop" => Ok(TriggerAction::Stop),
            "status" => Ok(TriggerAction::Status),
            other => Err(format!("invalid action: {other}")),
        }
    }
}

/// Body of `POST /trigger`. The action stays a string so unknown values can
/// be rejected with a 400 instead of a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sync_running: bool,
    /// Unix seconds.
    pub timestamp: i64,
}

#[derive(Clone, Debug)]
pub struct TriggerClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl TriggerClient {
    pub fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url =
            Url::parse(&normalized).map_err(|e| RemoteError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            timeout,
        })
    }

    pub fn from_config(config: &NotifierConfig) -> RemoteResult<Self> {
        Self::new(&config.file_sync_url, config.timeout())
    }

    fn url(&self, path: &str) -> RemoteResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RemoteError::InvalidUrl(format!("{path}: {e}")))
    }

    pub async fn trigger(&self, action: TriggerAction) -> RemoteResult<TriggerResponse> {
        let body = TriggerRequest {
            action: Some(action.as_str().to_string()),
        };
        let req = self
            .http
            .post(self.url("trigger")?)
            .json(&body)
            .timeout(self.timeout);
        Ok(send_checked(req).await?.json().await?)
    }

    pub async fn health(&self) -> RemoteResult<HealthResponse> {
        let req = self.http.get(self.url("health")?).timeout(self.timeout);
        Ok(send_checked(req).await?.json().await?)
    }

    pub async fn reconcile(&self) -> RemoteResult<TriggerResponse> {
        let req = self.http.post(self.url("reconcile")?).timeout(self.timeout);
        Ok(send_checked(req).await?.json().await?)
    }

    /// Ask the listener to start its loop after a like change.
    ///
    /// Delivery is best effort: failures are logged and never returned.
    pub async fn notify(&self) {
        match self.trigger(TriggerAction::Start).await {
            Ok(response) => debug!(status = %response.status, "file sync notified"),
            Err(e) => warn!(error = %e, "file sync notification failed"),
        }
    }
}
