//! aria2 JSON-RPC client.
//!
//! The transport follows the URL scheme: `http(s)://` posts each request,
//! `ws(s)://` opens a socket per call and waits for the matching reply.

use crate::error::{RemoteError, RemoteResult};
use futures::{SinkExt, StreamExt};
use konakore_core::config::DaemonConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, instrument};

/// aria2 method that queues a new download.
pub const ADD_URI: &str = "aria2.addUri";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    WebSocket,
}

impl Transport {
    fn from_url(url: &str) -> RemoteResult<Self> {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("ws://") || lower.starts_with("wss://") {
            Ok(Transport::WebSocket)
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(Transport::Http)
        } else {
            Err(RemoteError::InvalidUrl(format!(
                "daemon URL must be http(s) or ws(s): {url}"
            )))
        }
    }
}

/// Per-download options passed to `aria2.addUri`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddUriOptions {
    pub dir: String,
    pub out: String,
}

/// Accepted download.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// aria2 task id.
    pub gid: String,
    /// `{gid, method, params}` as stored on the file sync entry. Never holds
    /// the secret.
    pub audit: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Clone)]
pub struct DaemonClient {
    http: reqwest::Client,
    url: String,
    transport: Transport,
    secret: Option<String>,
    timeout: Duration,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for DaemonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonClient")
            .field("url", &self.url)
            .field("transport", &self.transport)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl DaemonClient {
    pub fn new(url: &str, secret: Option<String>, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            transport: Transport::from_url(url)?,
            url: url.to_string(),
            secret: secret.filter(|s| !s.is_empty()),
            timeout,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn from_config(config: &DaemonConfig) -> RemoteResult<Self> {
        Self::new(
            &config.url,
            config.secret().map(str::to_string),
            config.timeout(),
        )
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    fn request_body(&self, id: &str, method: &str, params: &[Value]) -> Value {
        let mut full = Vec::with_capacity(params.len() + 1);
        if let Some(secret) = &self.secret {
            full.push(Value::String(format!("token:{secret}")));
        }
        full.extend(params.iter().cloned());
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": full,
        })
    }

    /// Issue one RPC call and return its `result`.
    #[instrument(skip(self, params), fields(transport = ?self.transport))]
    pub async fn call(&self, method: &str, params: &[Value]) -> RemoteResult<Value> {
        let id = format!("konakore-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let body = self.request_body(&id, method, params);

        let response = match self.transport {
            Transport::Http => self.call_http(&body).await?,
            Transport::WebSocket => {
                tokio::time::timeout(self.timeout, self.call_ws(&id, &body))
                    .await
                    .map_err(|_| RemoteError::Timeout(self.url.clone()))??
            }
        };

        if let Some(err) = response.error {
            return Err(RemoteError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| RemoteError::Decode("RPC response has neither result nor error".into()))
    }

    async fn call_http(&self, body: &Value) -> RemoteResult<RpcResponse> {
        let response = self
            .http
            .post(&self.url)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteError::Timeout(self.url.clone())
                } else {
                    RemoteError::Http(e)
                }
            })?;
        let status = response.status();
        let text = response.text().await?;
        let parsed = serde_json::from_str::<RpcResponse>(&text);
        // aria2 answers RPC failures with a non-2xx status and an error body.
        if !status.is_success() {
            return match parsed {
                Ok(reply) if reply.error.is_some() => Ok(reply),
                _ => Err(RemoteError::Status {
                    status: status.as_u16(),
                    url: self.url.clone(),
                }),
            };
        }
        Ok(parsed?)
    }

    async fn call_ws(&self, id: &str, body: &Value) -> RemoteResult<RpcResponse> {
        let (mut ws, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        ws.send(Message::Text(body.to_string().into())).await?;

        let result = loop {
            let Some(frame) = ws.next().await else {
                break Err(RemoteError::WebSocket(
                    "connection closed before reply".into(),
                ));
            };
            match frame? {
                Message::Text(text) => {
                    let parsed: RpcResponse = serde_json::from_str(&text)?;
                    // Skip aria2 event notifications, which carry no id.
                    if parsed.id.as_ref().and_then(Value::as_str) == Some(id) {
                        break Ok(parsed);
                    }
                    debug!("skipping unrelated daemon message");
                }
                Message::Close(_) => {
                    break Err(RemoteError::WebSocket(
                        "connection closed before reply".into(),
                    ));
                }
                _ => {}
            }
        };

        if let Err(e) = ws.close(None).await {
            debug!(error = %e, "daemon websocket close failed");
        }
        result
    }

    /// Queue a download and return the task id with its audit record.
    pub async fn add_uri(&self, url: &str, options: &AddUriOptions) -> RemoteResult<Submission> {
        let params = vec![json!([url]), serde_json::to_value(options)?];
        let result = self.call(ADD_URI, &params).await?;
        let gid = match result {
            Value::String(gid) => gid,
            other => other.to_string(),
        };
        let audit = json!({
            "gid": gid,
            "method": ADD_URI,
            "params": params,
        });
        Ok(Submission { gid, audit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_follows_scheme() {
        let timeout = Duration::from_secs(1);
        let http = DaemonClient::new("http://localhost:6800/jsonrpc", None, timeout).unwrap();
        assert_eq!(http.transport(), Transport::Http);
        let ws = DaemonClient::new("WSS://aria.example/jsonrpc", None, timeout).unwrap();
        assert_eq!(ws.transport(), Transport::WebSocket);
        assert!(DaemonClient::new("ftp://nope", None, timeout).is_err());
    }

    #[test]
    fn secret_is_prepended_as_token() {
        let client = DaemonClient::new(
            "http://localhost:6800/jsonrpc",
            Some("s3cret".into()),
            Duration::from_secs(1),
        )
        .unwrap();
        let body = client.request_body("1", ADD_URI, &[json!(["http://a/b.jpg"])]);
        assert_eq!(body["params"][0], "token:s3cret");
        assert_eq!(body["params"][1], json!(["http://a/b.jpg"]));
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["method"], "aria2.addUri");
    }

    #[test]
    fn empty_secret_is_ignored() {
        let client = DaemonClient::new(
            "http://localhost:6800/jsonrpc",
            Some(String::new()),
            Duration::from_secs(1),
        )
        .unwrap();
        let body = client.request_body("1", ADD_URI, &[]);
        assert_eq!(body["params"], json!([]));
        assert!(!format!("{client:?}").contains("token"));
    }
}
