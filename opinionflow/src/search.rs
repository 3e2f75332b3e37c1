//! Search client: one chat-search pass through the proxy.

use reqwest::Url;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::errors::{OpinionflowError, Result};
use crate::models::{SearchOutcome, SearchResult};
use crate::transport::{Transport, SEARCH_SERVICE};

/// Hostnames that never carry article content.
pub const BLOCKED_HOSTS: &[&str] = &["baidu.com", "www.baidu.com", "image.baidu.com", "v.baidu.com"];

/// URL fragments marking image or video pages.
pub const BLOCKED_URL_PATTERNS: &[&str] =
    &["image.baidu.com", "/image", "/img", "/video", "/vod", "v.qq.com", "tv."];

const UNTITLED: &str = "来源";
const UNKNOWN_SOURCE: &str = "baidu.ai";

/// Builds the provider request body.
#[must_use]
pub fn build_search_payload(query: &str, config: &PipelineConfig) -> Value {
    let mut payload = json!({
        "service": SEARCH_SERVICE,
        "messages": [{ "role": "user", "content": query }],
        "stream": false,
        "model": config.search_model,
        "search_source": "baidu_search_v2",
        "resource_type_filter": [{ "type": "web", "top_k": config.clamped_top_k() }],
        "enable_corner_markers": true,
    });
    let sites = config.sites();
    if !sites.is_empty() {
        payload["search_filter"] = json!({ "match": { "site": sites } });
    }
    payload
}

/// Lower-cased hostname of `url`, empty if it has none.
#[must_use]
pub fn hostname(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_default()
}

/// Whether a reference points at a non-article page.
#[must_use]
pub fn is_blocked(url: &str, host: &str) -> bool {
    if BLOCKED_HOSTS.contains(&host) {
        return true;
    }
    let lowered = url.to_lowercase();
    BLOCKED_URL_PATTERNS.iter().any(|p| lowered.contains(p))
}

fn str_field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| item.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

/// Extracts accepted results and the provider summary from a reply.
///
/// Filtering happens while collecting, so rejected entries never count
/// toward `top_k`.
#[must_use]
pub fn parse_search_response(data: &Value, top_k: usize) -> SearchOutcome {
    let message = &data["choices"][0]["message"];
    let summary = message["content"].as_str().unwrap_or_default().trim().to_string();

    let references = message["references"]
        .as_array()
        .filter(|refs| !refs.is_empty())
        .or_else(|| data["references"].as_array());

    let mut results = Vec::new();
    for item in references.into_iter().flatten() {
        if results.len() >= top_k {
            break;
        }
        let Some(url) = str_field(item, &["url", "href"]) else {
            continue;
        };
        let host = hostname(url);
        if is_blocked(url, &host) {
            continue;
        }
        let title = str_field(item, &["title", "name"]).unwrap_or(UNTITLED);
        let source = if host.is_empty() { UNKNOWN_SOURCE.to_string() } else { host };
        results.push(SearchResult::new(title, url, source));
    }

    SearchOutcome { results, summary }
}

/// Issues search requests through the proxy.
#[derive(Clone)]
pub struct SearchClient {
    transport: Arc<dyn Transport>,
    config: Arc<PipelineConfig>,
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient")
            .field("endpoint", &self.config.endpoint)
            .field("search_model", &self.config.search_model)
            .finish_non_exhaustive()
    }
}

impl SearchClient {
    /// Creates a search client.
    pub fn new(transport: Arc<dyn Transport>, config: Arc<PipelineConfig>) -> Self {
        Self { transport, config }
    }

    /// Runs one search pass.
    ///
    /// Any HTTP or network failure is a `SearchFailure`; the caller decides
    /// whether it was the first or the refinement pass.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(OpinionflowError::configuration("query must not be empty"));
        }
        let endpoint = self.config.endpoint_url()?;
        let top_k = self.config.clamped_top_k();
        let payload = build_search_payload(query, &self.config);

        let reply = self
            .transport
            .post_json(endpoint.as_str(), &payload)
            .await
            .map_err(|e| OpinionflowError::SearchFailure { status: None, body: e.to_string() })?;

        if !reply.is_success() {
            return Err(OpinionflowError::SearchFailure {
                status: Some(reply.status),
                body: reply.failure_detail(),
            });
        }

        let data: Value = serde_json::from_str(&reply.body).map_err(|e| {
            OpinionflowError::SearchFailure {
                status: Some(reply.status),
                body: format!("unparsable search response: {e}"),
            }
        })?;
        let outcome = parse_search_response(&data, top_k);

        tracing::info!(
            query = %query,
            accepted = outcome.results.len(),
            top_k,
            "Search pass complete"
        );
        Ok(outcome)
    }
}
