//! The observable event stream of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gate::GateOutcome;
use crate::models::SearchResult;

/// Which search pass produced a `search` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// First pass on the user's query.
    Ai,
    /// Refinement pass after a "not ready" verdict.
    AiRecheck,
}

/// Plan announced at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    /// Recency window requested from the provider.
    pub timelimit: String,
    /// Whether RSS sources are consulted.
    pub use_rss: bool,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            timelimit: "m".to_string(),
            use_rss: false,
        }
    }
}

/// One observable milestone of a run.
///
/// Serialized with a `type` tag. Tags this version does not know
/// deserialize to [`PipelineEvent::Unknown`] and should be ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// The run started.
    Planning {
        /// Run identifier.
        run_id: String,
        /// Search plan.
        plan: RunPlan,
        /// Crate version.
        version: String,
        /// When the run started.
        started_at: DateTime<Utc>,
    },
    /// A search pass started.
    Search {
        /// First pass or refinement.
        mode: SearchMode,
        /// Search batches issued so far, this one included.
        batch_count: usize,
        /// Query sent to the provider.
        query: String,
    },
    /// A search pass finished filtering.
    Filter {
        /// Results accepted in this pass.
        accepted_this_round: usize,
    },
    /// The gate judged a pass.
    Gate {
        /// 1 for the first pass, 2 for the refinement.
        round: usize,
        /// Whether the gate allowed proceeding.
        ready: bool,
        /// Confidence in `[0, 100]`.
        confidence: u8,
        /// Reasons given.
        reasons: Vec<String>,
        /// Suggested refinement keywords.
        refine_keywords: Vec<String>,
        /// Whether the default verdict was substituted.
        degraded: bool,
    },
    /// All fetches settled.
    Fetch {
        /// Successful fetches.
        success: usize,
        /// Failed fetches.
        fail: usize,
    },
    /// The run finished with a report.
    Final {
        /// Brief summary.
        summary: String,
        /// Markdown report.
        detailed_report: String,
        /// Materials used.
        items: Vec<SearchResult>,
    },
    /// The run failed.
    Error {
        /// Human-readable message.
        message: String,
    },
    /// A tag this version does not know.
    #[serde(other)]
    Unknown,
}

impl PipelineEvent {
    /// Builds a `gate` event from a gate outcome.
    #[must_use]
    pub fn gate(round: usize, outcome: &GateOutcome) -> Self {
        Self::Gate {
            round,
            ready: outcome.verdict.ready,
            confidence: outcome.verdict.confidence,
            reasons: outcome.verdict.reasons.clone(),
            refine_keywords: outcome.verdict.refine_keywords.clone(),
            degraded: outcome.degradation.is_some(),
        }
    }

    /// Builds an `error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// The event's `type` tag.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Planning { .. } => "planning",
            Self::Search { .. } => "search",
            Self::Filter { .. } => "filter",
            Self::Gate { .. } => "gate",
            Self::Fetch { .. } => "fetch",
            Self::Final { .. } => "final",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this event ends the run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final { .. } | Self::Error { .. })
    }

    /// The event as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
