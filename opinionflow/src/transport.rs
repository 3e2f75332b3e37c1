//! The network seam every stage calls through.
//!
//! Stages never talk to `reqwest` directly; they hold an
//! `Arc<dyn Transport>` so runs can be driven by a scripted transport in
//! tests or by the in-process proxy.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use std::collections::HashMap;
use std::time::Instant;

use crate::config::HttpConfig;
use crate::errors::{OpinionflowError, Result};

/// Status and body of an HTTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
    /// Auth schemes tried in order, set by the proxy on a failed search.
    pub auth_schemes: Vec<String>,
}

impl HttpReply {
    /// Creates a reply.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            auth_schemes: Vec::new(),
        }
    }

    /// Attaches the auth schemes that led to this reply.
    #[must_use]
    pub fn with_auth_schemes(mut self, schemes: impl IntoIterator<Item = impl ToString>) -> Self {
        self.auth_schemes = schemes.into_iter().map(|s| s.to_string()).collect();
        self
    }

    /// Body plus the tried auth schemes, for error messages.
    #[must_use]
    pub fn failure_detail(&self) -> String {
        if self.auth_schemes.is_empty() {
            self.body.clone()
        } else {
            format!("{} [auth schemes tried: {}]", self.body, self.auth_schemes.join(", "))
        }
    }

    /// A 200 reply.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    /// Whether the reply was successful (2xx status).
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Converts a non-success reply into an upstream error.
    pub fn into_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(OpinionflowError::Upstream { status: self.status, body: self.body })
        }
    }
}

/// Which provider surface a request is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Chat-search request tagged `service: "baidu"`.
    Search,
    /// Raw-fetch passthrough `{url}`.
    Fetch,
    /// Plain chat completion.
    Chat,
}

impl RequestKind {
    /// Classifies a proxy request body.
    #[must_use]
    pub fn classify(body: &serde_json::Value) -> Self {
        if body.get("service").and_then(serde_json::Value::as_str) == Some(SEARCH_SERVICE) {
            Self::Search
        } else if body.get("url").is_some() && body.get("messages").is_none() {
            Self::Fetch
        } else {
            Self::Chat
        }
    }
}

/// Service tag that routes a request to the search provider.
pub const SEARCH_SERVICE: &str = "baidu";

/// Protocol for posting JSON to the proxy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts `body` to `url` and returns the raw reply.
    ///
    /// Non-success statuses are returned as an `HttpReply`, only
    /// network-level failures are an `Err`.
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport from the given settings.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self { client: build_client(config)? })
    }
}

/// Builds a `reqwest` client honouring timeout, user agent and headers.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let headers = header_map(&config.headers)?;
    reqwest::Client::builder()
        .timeout(config.timeout()?)
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .build()
        .map_err(OpinionflowError::from)
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    map.insert(ACCEPT, HeaderValue::from_static("application/json"));
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| OpinionflowError::configuration(format!("invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| OpinionflowError::configuration(format!("invalid header value for '{key}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply> {
        let started = Instant::now();
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        tracing::debug!(
            url = %url,
            status,
            bytes = text.len(),
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "POST complete"
        );

        Ok(HttpReply::new(status, text))
    }
}
