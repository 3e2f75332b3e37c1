//! Request routing for the in-process proxy.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Url;
use std::time::Instant;

use super::auth::{negotiate, UpstreamRequest};
use crate::config::ProxyConfig;
use crate::errors::{OpinionflowError, Result};
use crate::transport::{build_client, HttpReply, RequestKind, Transport};

/// Error code returned when the chat credential is missing.
pub const MISSING_CHAT_KEY: &str = "missing_api_key";
/// Error code returned when the search credential is missing.
pub const MISSING_SEARCH_KEY: &str = "missing_baidu_api_key";

/// A 401 reply naming the missing credential.
#[must_use]
pub fn missing_key_reply(code: &str) -> HttpReply {
    HttpReply::new(401, serde_json::json!({ "error": code }).to_string())
}

fn token(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|t| !t.is_empty())
}

/// A [`Transport`] that talks to the providers directly.
///
/// The URL passed to [`Transport::post_json`] is ignored; the body alone
/// decides where a request goes.
#[derive(Debug, Clone)]
pub struct ProxyTransport {
    client: reqwest::Client,
    config: ProxyConfig,
}

impl ProxyTransport {
    /// Creates a proxy from the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let client = build_client(&config.http)?;
        Ok(Self { client, config })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    async fn send(&self, request: UpstreamRequest, body: &serde_json::Value) -> Result<HttpReply> {
        let mut builder = self.client.post(request.url).json(body);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        Ok(HttpReply::new(status, response.text().await?))
    }

    async fn search(&self, body: &serde_json::Value) -> Result<HttpReply> {
        let Some(token) = token(self.config.search_token.as_deref()) else {
            tracing::warn!("Search credential missing");
            return Ok(missing_key_reply(MISSING_SEARCH_KEY));
        };
        let upstream = parse_upstream(&self.config.search_upstream)?;

        let negotiated = negotiate(&upstream, token, |request| self.send(request, body)).await?;
        tracing::debug!(
            status = negotiated.reply.status,
            scheme = %negotiated.scheme,
            attempts = negotiated.tried.len(),
            "Search upstream replied"
        );
        if negotiated.reply.is_success() {
            Ok(negotiated.reply)
        } else {
            Ok(negotiated.reply.with_auth_schemes(negotiated.tried))
        }
    }

    async fn chat(&self, body: &serde_json::Value) -> Result<HttpReply> {
        let Some(token) = token(self.config.chat_token.as_deref()) else {
            tracing::warn!("Chat credential missing");
            return Ok(missing_key_reply(MISSING_CHAT_KEY));
        };
        let upstream = parse_upstream(&self.config.chat_upstream)?;
        let auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| OpinionflowError::configuration(format!("invalid chat token: {e}")))?;

        let response = self
            .client
            .post(upstream)
            .header(AUTHORIZATION, auth)
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        Ok(HttpReply::new(status, response.text().await?))
    }

    async fn fetch(&self, body: &serde_json::Value) -> Result<HttpReply> {
        let target = body
            .get("url")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        let Ok(url) = Url::parse(target) else {
            return Ok(HttpReply::new(400, serde_json::json!({ "error": "invalid_url" }).to_string()));
        };

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")
            .send()
            .await?;
        let status = response.status().as_u16();
        Ok(HttpReply::new(status, response.text().await?))
    }
}

fn parse_upstream(raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).map_err(|e| OpinionflowError::configuration(format!("invalid upstream '{raw}': {e}")))
}

#[async_trait]
impl Transport for ProxyTransport {
    async fn post_json(&self, _url: &str, body: &serde_json::Value) -> Result<HttpReply> {
        let started = Instant::now();
        let kind = RequestKind::classify(body);
        let reply = match kind {
            RequestKind::Search => self.search(body).await?,
            RequestKind::Chat => self.chat(body).await?,
            RequestKind::Fetch => self.fetch(body).await?,
        };

        tracing::debug!(
            kind = ?kind,
            status = reply.status,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Proxy request complete"
        );
        Ok(reply)
    }
}
