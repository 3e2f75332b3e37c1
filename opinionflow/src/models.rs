//! Data models shared by the pipeline stages.

use serde::{Deserialize, Serialize};

/// A single search hit, later enriched with fetched full text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    /// Title reported by the provider.
    pub title: String,
    /// Target URL.
    pub href: String,
    /// Lower-cased hostname of `href`.
    pub source: String,
    /// Sanitized full text, empty until fetched.
    #[serde(default)]
    pub body: String,
}

impl SearchResult {
    /// Creates a result with an empty body.
    #[must_use]
    pub fn new(title: impl Into<String>, href: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
            source: source.into(),
            body: String::new(),
        }
    }

    /// Returns a copy carrying the given body.
    #[must_use]
    pub fn with_body(&self, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..self.clone()
        }
    }
}

/// Results in provider order.
pub type ResultSet = Vec<SearchResult>;

/// What a search pass returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Accepted results.
    pub results: ResultSet,
    /// The provider's own answer text.
    pub summary: String,
}

/// The gate's judgment on a result set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateVerdict {
    /// Whether the material justifies writing the report.
    pub ready: bool,
    /// Confidence in `[0, 100]`.
    pub confidence: u8,
    /// Reasons given by the model.
    pub reasons: Vec<String>,
    /// At most three keywords for a refinement search.
    pub refine_keywords: Vec<String>,
    /// A full replacement query, may be empty.
    pub recheck_query: String,
}

impl Default for GateVerdict {
    fn default() -> Self {
        Self {
            ready: false,
            confidence: 50,
            reasons: vec!["no verdict obtained".to_string()],
            refine_keywords: Vec::new(),
            recheck_query: String::new(),
        }
    }
}

impl GateVerdict {
    /// Builds the refinement query for `original`.
    ///
    /// `recheck_query` wins when present, otherwise the refine keywords are
    /// appended to the original query.
    #[must_use]
    pub fn refinement_query(&self, original: &str) -> String {
        let recheck = self.recheck_query.trim();
        if !recheck.is_empty() {
            return recheck.to_string();
        }
        let mut query = original.trim().to_string();
        for keyword in self.refine_keywords.iter().take(3) {
            query.push(' ');
            query.push_str(keyword);
        }
        query
    }
}

/// What the fetch stage produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Successfully fetched results, in input order.
    pub cleaned: ResultSet,
    /// Number of successful fetches.
    pub success_count: usize,
    /// Number of failed fetches.
    pub fail_count: usize,
}

impl FetchOutcome {
    /// Number of items that were submitted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.success_count + self.fail_count
    }
}

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction.
    System,
    /// User turn.
    User,
    /// Model turn.
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Truncates `text` to at most `max` characters.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
