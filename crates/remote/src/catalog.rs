//! Remote post/tag catalog client.

use crate::error::{RemoteError, RemoteResult, send_checked};
use konakore_core::RemoteTag;
use konakore_core::config::RemoteConfig;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Clone, Debug)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: Url,
    posts_per_page: u32,
    posts_timeout: Duration,
    tags_timeout: Duration,
}

impl CatalogClient {
    pub fn new(base_url: &str, posts_per_page: u32) -> RemoteResult<Self> {
        let defaults = RemoteConfig::default();
        Self::with_client(
            reqwest::Client::new(),
            base_url,
            posts_per_page,
            defaults.posts_timeout(),
            defaults.tags_timeout(),
        )
    }

    pub fn from_config(config: &RemoteConfig) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Self::with_client(
            http,
            &config.base_url,
            config.posts_per_page,
            config.posts_timeout(),
            config.tags_timeout(),
        )
    }

    fn with_client(
        http: reqwest::Client,
        base_url: &str,
        posts_per_page: u32,
        posts_timeout: Duration,
        tags_timeout: Duration,
    ) -> RemoteResult<Self> {
        // A trailing slash keeps `join` from replacing the last path segment.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url =
            Url::parse(&normalized).map_err(|e| RemoteError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            http,
            base_url,
            posts_per_page,
            posts_timeout,
            tags_timeout,
        })
    }

    fn url(&self, path: &str) -> RemoteResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RemoteError::InvalidUrl(format!("{path}: {e}")))
    }

    /// Fetch one page of posts. An empty vector means the catalog is exhausted.
    #[instrument(skip(self))]
    pub async fn fetch_posts(&self, page: u32) -> RemoteResult<Vec<Value>> {
        let mut url = self.url("post.json")?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("limit", &self.posts_per_page.to_string());

        let response = send_checked(self.http.get(url).timeout(self.posts_timeout)).await?;
        let body: Value = response.json().await?;
        match body {
            Value::Array(posts) => {
                debug!(page, count = posts.len(), "fetched post page");
                Ok(posts)
            }
            other => Err(RemoteError::Decode(format!(
                "expected an array of posts, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Fetch the whole tag vocabulary in one request.
    #[instrument(skip(self))]
    pub async fn fetch_tags(&self) -> RemoteResult<Vec<RemoteTag>> {
        let mut url = self.url("tag.json")?;
        url.query_pairs_mut().append_pair("limit", "0");

        let response = send_checked(self.http.get(url).timeout(self.tags_timeout)).await?;
        let bytes = response.bytes().await?;
        let tags: Vec<RemoteTag> = serde_json::from_slice(&bytes)?;
        debug!(count = tags.len(), "fetched tag catalog");
        Ok(tags)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
