//! Configuration types for a pipeline run and the provider proxy.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::errors::{OpinionflowError, Result};

/// Smallest accepted result cap for a search pass.
pub const MIN_TOP_K: usize = 1;
/// Largest accepted result cap for a search pass.
pub const MAX_TOP_K: usize = 20;
/// Sites beyond this count are not sent to the provider.
pub const MAX_SITE_FILTER: usize = 5;

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Additional headers to include.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_timeout() -> f64 {
    30.0
}

fn default_user_agent() -> String {
    concat!("opinionflow/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
            headers: HashMap::new(),
        }
    }
}

impl HttpConfig {
    /// Creates a new HTTP configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Gets timeout as Duration.
    ///
    /// Negative, non-finite or overflowing values are a configuration error.
    pub fn timeout(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.timeout_seconds).map_err(|e| {
            OpinionflowError::configuration(format!(
                "invalid timeout_seconds {}: {e}",
                self.timeout_seconds
            ))
        })
    }
}

/// Configuration supplied once per pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Proxy endpoint for chat and search requests.
    #[serde(default)]
    pub endpoint: String,
    /// Raw-fetch passthrough. Defaults to `{origin}/api/fetch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_endpoint: Option<String>,
    /// Model used by the gate and report writer.
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used by the search provider.
    #[serde(default = "default_search_model")]
    pub search_model: String,
    /// Result cap for each search pass.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Restrict search to these sites.
    #[serde(default)]
    pub site_filter: Vec<String>,
    /// Sampling temperature for chat calls.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Transport settings.
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_model() -> String {
    "doubao-seed-1-6-251015".to_string()
}

fn default_search_model() -> String {
    "ERNIE-4.0-mini".to_string()
}

fn default_top_k() -> usize {
    10
}

fn default_temperature() -> f64 {
    0.7
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            fetch_endpoint: None,
            model: default_model(),
            search_model: default_search_model(),
            top_k: default_top_k(),
            site_filter: Vec::new(),
            temperature: default_temperature(),
            http: HttpConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration pointing at the given proxy endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Sets the writer model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the search model.
    #[must_use]
    pub fn with_search_model(mut self, model: impl Into<String>) -> Self {
        self.search_model = model.into();
        self
    }

    /// Sets the result cap.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Sets the fetch passthrough endpoint.
    #[must_use]
    pub fn with_fetch_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.fetch_endpoint = Some(endpoint.into());
        self
    }

    /// Adds a site to the search filter.
    #[must_use]
    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site_filter.push(site.into());
        self
    }

    /// Sets the transport settings.
    #[must_use]
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Loads a configuration from `OPINIONFLOW_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(endpoint) = lookup("OPINIONFLOW_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(fetch) = lookup("OPINIONFLOW_FETCH_ENDPOINT") {
            config.fetch_endpoint = Some(fetch);
        }
        if let Some(model) = lookup("OPINIONFLOW_MODEL") {
            config.model = model;
        }
        if let Some(model) = lookup("OPINIONFLOW_SEARCH_MODEL") {
            config.search_model = model;
        }
        if let Some(top_k) = lookup("OPINIONFLOW_TOP_K") {
            config.top_k = top_k.trim().parse().map_err(|_| {
                OpinionflowError::configuration(format!("OPINIONFLOW_TOP_K is not a number: {top_k}"))
            })?;
        }
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Checks that the endpoints are usable.
    pub fn validate(&self) -> Result<()> {
        self.endpoint_url()?;
        self.fetch_url()?;
        self.http.timeout()?;
        Ok(())
    }

    /// Returns the parsed proxy endpoint.
    pub fn endpoint_url(&self) -> Result<Url> {
        let raw = self.endpoint.trim();
        if raw.is_empty() {
            return Err(OpinionflowError::configuration("endpoint is required"));
        }
        Url::parse(raw)
            .map_err(|e| OpinionflowError::configuration(format!("invalid endpoint '{raw}': {e}")))
    }

    /// Returns the fetch passthrough URL.
    pub fn fetch_url(&self) -> Result<Url> {
        if let Some(raw) = self.fetch_endpoint.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            return Url::parse(raw).map_err(|e| {
                OpinionflowError::configuration(format!("invalid fetch endpoint '{raw}': {e}"))
            });
        }
        let mut url = self.endpoint_url()?;
        url.set_path("/api/fetch");
        url.set_query(None);
        Ok(url)
    }

    /// Returns `top_k` clamped to the accepted range.
    #[must_use]
    pub fn clamped_top_k(&self) -> usize {
        self.top_k.clamp(MIN_TOP_K, MAX_TOP_K)
    }

    /// Returns the site filter as sent to the provider.
    #[must_use]
    pub fn sites(&self) -> &[String] {
        &self.site_filter[..self.site_filter.len().min(MAX_SITE_FILTER)]
    }
}

/// Default upstream for search requests.
pub const DEFAULT_SEARCH_UPSTREAM: &str = "https://qianfan.baidubce.com/v2/chat/completions";
/// Default upstream for chat requests.
pub const DEFAULT_CHAT_UPSTREAM: &str = "https://ark.cn-beijing.volces.com/api/v3/chat/completions";

/// Configuration for the provider proxy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyConfig {
    /// Search provider upstream.
    #[serde(default = "default_search_upstream")]
    pub search_upstream: String,
    /// Chat provider upstream.
    #[serde(default = "default_chat_upstream")]
    pub chat_upstream: String,
    /// Search provider credential.
    #[serde(default, skip_serializing)]
    pub search_token: Option<String>,
    /// Chat provider credential.
    #[serde(default, skip_serializing)]
    pub chat_token: Option<String>,
    /// Transport settings.
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_search_upstream() -> String {
    DEFAULT_SEARCH_UPSTREAM.to_string()
}

fn default_chat_upstream() -> String {
    DEFAULT_CHAT_UPSTREAM.to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            search_upstream: default_search_upstream(),
            chat_upstream: default_chat_upstream(),
            search_token: None,
            chat_token: None,
            http: HttpConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Creates a proxy configuration with default upstreams.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads tokens from `BAIDU_API_KEY` and `VOLC_API_KEY`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            search_token: std::env::var("BAIDU_API_KEY").ok().filter(|k| !k.is_empty()),
            chat_token: std::env::var("VOLC_API_KEY").ok().filter(|k| !k.is_empty()),
            ..Self::default()
        }
    }

    /// Sets the search upstream and token.
    #[must_use]
    pub fn with_search(mut self, upstream: impl Into<String>, token: impl Into<String>) -> Self {
        self.search_upstream = upstream.into();
        self.search_token = Some(token.into());
        self
    }

    /// Sets the chat upstream and token.
    #[must_use]
    pub fn with_chat(mut self, upstream: impl Into<String>, token: impl Into<String>) -> Self {
        self.chat_upstream = upstream.into();
        self.chat_token = Some(token.into());
        self
    }
}
