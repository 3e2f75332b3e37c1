//! Error types for the opinionflow pipeline.
//!
//! Only a handful of these ever terminate a run. Gate, fetch and report
//! failures are absorbed locally and surface as a [`Degradation`] in the
//! logs instead of an `Err`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for opinionflow operations.
#[derive(Debug, Error)]
pub enum OpinionflowError {
    /// Empty query or missing/invalid endpoint configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The first search pass failed. Fatal.
    #[error("Search failed ({}): {body}", status_label(*status))]
    SearchFailure {
        /// Upstream HTTP status, `None` for a network failure.
        status: Option<u16>,
        /// Upstream body or transport message.
        body: String,
    },

    /// The refinement search pass failed. Fatal.
    #[error("Refine search failed ({}): {body}", status_label(*status))]
    RefineSearchFailure {
        /// Upstream HTTP status, `None` for a network failure.
        status: Option<u16>,
        /// Upstream body or transport message.
        body: String,
    },

    /// A chat or fetch call returned a non-success status.
    #[error("Upstream error {status}: {body}")]
    Upstream {
        /// HTTP status.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Network-level failure with no HTTP status.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_label(status: Option<u16>) -> String {
    status.map_or_else(|| "network".to_string(), |s| s.to_string())
}

impl From<serde_json::Error> for OpinionflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for OpinionflowError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl OpinionflowError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns true for the kinds that terminate a run in `error`.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::SearchFailure { .. } | Self::RefineSearchFailure { .. }
        )
    }

    /// Re-tags a failure from the first search pass as a refinement failure.
    #[must_use]
    pub fn into_refine(self) -> Self {
        match self {
            Self::SearchFailure { status, body } => Self::RefineSearchFailure { status, body },
            other => other,
        }
    }

    /// Returns the short type name used in dictionaries and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::SearchFailure { .. } => "SearchFailure",
            Self::RefineSearchFailure { .. } => "RefineSearchFailure",
            Self::Upstream { .. } => "UpstreamError",
            Self::Transport(_) => "TransportError",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IoError",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));

        match self {
            Self::SearchFailure { status, .. } | Self::RefineSearchFailure { status, .. } => {
                map.insert("status".to_string(), serde_json::json!(status));
            }
            Self::Upstream { status, .. } => {
                map.insert("status".to_string(), serde_json::json!(status));
            }
            _ => {}
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// A failure recovered locally by substituting a conservative default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Gate call failed or its output could not be decoded.
    GateDegraded {
        /// What went wrong.
        reason: String,
    },
    /// A single material's full-text fetch failed.
    FetchItemFailure {
        /// The material URL.
        href: String,
        /// What went wrong.
        reason: String,
    },
    /// The report-writing call failed.
    ReportDegraded {
        /// What went wrong.
        reason: String,
    },
}

impl Degradation {
    /// Logs the degradation at warn level.
    pub fn log(&self) {
        match self {
            Self::GateDegraded { reason } => {
                tracing::warn!(kind = "gate_degraded", %reason, "Gate degraded to default verdict");
            }
            Self::FetchItemFailure { href, reason } => {
                tracing::warn!(kind = "fetch_item_failure", %href, %reason, "Dropping material");
            }
            Self::ReportDegraded { reason } => {
                tracing::warn!(kind = "report_degraded", %reason, "Falling back to minimal report");
            }
        }
    }
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GateDegraded { reason } => write!(f, "gate degraded: {reason}"),
            Self::FetchItemFailure { href, reason } => write!(f, "fetch failed for {href}: {reason}"),
            Self::ReportDegraded { reason } => write!(f, "report degraded: {reason}"),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = OpinionflowError> = std::result::Result<T, E>;
