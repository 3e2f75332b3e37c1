//! Fetch stage: concurrent full-text retrieval for candidate results.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;

use crate::errors::{Degradation, Result};
use crate::models::{truncate_chars, FetchOutcome, SearchResult};
use crate::sanitize::sanitize;
use crate::transport::Transport;

/// Characters of sanitized text kept per material.
pub const MAX_BODY_CHARS: usize = 4000;

/// Retrieves full text through the proxy's raw-fetch passthrough.
#[derive(Clone)]
pub struct FetchStage {
    transport: Arc<dyn Transport>,
    fetch_url: String,
}

impl std::fmt::Debug for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStage")
            .field("fetch_url", &self.fetch_url)
            .finish_non_exhaustive()
    }
}

impl FetchStage {
    /// Creates a fetch stage posting to `fetch_url`.
    pub fn new(transport: Arc<dyn Transport>, fetch_url: impl Into<String>) -> Self {
        Self {
            transport,
            fetch_url: fetch_url.into(),
        }
    }

    async fn fetch_one(&self, result: &SearchResult) -> Result<SearchResult> {
        let body = serde_json::json!({ "url": result.href });
        let reply = self
            .transport
            .post_json(&self.fetch_url, &body)
            .await?
            .into_success()?;
        let text = sanitize(&reply.body);
        Ok(result.with_body(truncate_chars(&text, MAX_BODY_CHARS)))
    }

    /// Fetches every result concurrently and waits for all to settle.
    ///
    /// Failed items are counted and dropped; input results are never
    /// mutated. `success_count + fail_count == results.len()` always holds.
    pub async fn fetch_all(&self, results: &[SearchResult]) -> FetchOutcome {
        let started = Instant::now();
        let settled = join_all(results.iter().map(|r| self.fetch_one(r))).await;

        let mut cleaned = Vec::with_capacity(results.len());
        let mut fail_count = 0;
        for (original, outcome) in results.iter().zip(settled) {
            match outcome {
                Ok(material) => {
                    tracing::debug!(href = %material.href, chars = material.body.chars().count(), "Fetched material");
                    cleaned.push(material);
                }
                Err(e) => {
                    Degradation::FetchItemFailure {
                        href: original.href.clone(),
                        reason: e.to_string(),
                    }
                    .log();
                    fail_count += 1;
                }
            }
        }

        let success_count = cleaned.len();
        tracing::info!(
            success = success_count,
            fail = fail_count,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Fetch stage complete"
        );

        FetchOutcome {
            cleaned,
            success_count,
            fail_count,
        }
    }
}
