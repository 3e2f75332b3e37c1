//! Report generator: the final report-writing call.

use std::fmt::Write as _;

use crate::errors::Degradation;
use crate::llm::ChatClient;
use crate::models::{truncate_chars, ChatMessage, SearchResult};

/// Materials beyond this index are left out of the prompt.
pub const REPORT_MAX_MATERIALS: usize = 15;
/// Characters of body included per material.
pub const REPORT_EXCERPT_CHARS: usize = 500;

/// Section headings the report must contain, in order.
pub const REPORT_SECTIONS: [&str; 7] = [
    "Overview",
    "Timeline",
    "Entities",
    "Authoritative sources",
    "Public sentiment",
    "Risk",
    "Conclusion",
];

const NO_SUMMARY: &str = "(no summary available)";

const REPORT_SYSTEM_PROMPT: &str =
    "You are a professional public-opinion analyst who writes structured Markdown reports.";

/// Builds the report-writing prompt.
#[must_use]
pub fn build_report_messages(query: &str, brief_summary: &str, materials: &[SearchResult]) -> Vec<ChatMessage> {
    let mut prompt = format!("Topic: {query}\n\n");
    let summary = brief_summary.trim();
    let _ = writeln!(prompt, "Brief summary: {}\n", if summary.is_empty() { NO_SUMMARY } else { summary });

    prompt.push_str("Materials:\n");
    if materials.is_empty() {
        prompt.push_str("(no materials could be retrieved)\n");
    }
    for (i, material) in materials.iter().take(REPORT_MAX_MATERIALS).enumerate() {
        let _ = writeln!(prompt, "[{}] {}", i + 1, material.title);
        let _ = writeln!(prompt, "Source: {}", material.source);
        let _ = writeln!(prompt, "URL: {}", material.href);
        let _ = writeln!(prompt, "Excerpt: {}\n", truncate_chars(&material.body, REPORT_EXCERPT_CHARS));
    }

    prompt.push_str("Write a public-opinion analysis report in Markdown with exactly these seven sections, in order:\n");
    for (i, section) in REPORT_SECTIONS.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {section}", i + 1);
    }
    prompt.push_str(
        "Cite materials inline by their bracket number. \
         Do NOT include a references or bibliography section. \
         Write in the same language as the topic.",
    );

    vec![ChatMessage::system(REPORT_SYSTEM_PROMPT), ChatMessage::user(prompt)]
}

/// Minimal report used when the writer call fails.
#[must_use]
pub fn fallback_report(query: &str, brief_summary: &str) -> String {
    let summary = brief_summary.trim();
    format!(
        "# Public-opinion report: {query}\n\n## Overview\n\n{}\n",
        if summary.is_empty() { NO_SUMMARY } else { summary }
    )
}

/// Writes the final report.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    chat: ChatClient,
}

impl ReportGenerator {
    /// Creates a generator that writes through `chat`.
    #[must_use]
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }

    /// Generates the Markdown report. Never fails.
    pub async fn generate_report(&self, query: &str, brief_summary: &str, materials: &[SearchResult]) -> String {
        let messages = build_report_messages(query, brief_summary, materials);
        match self.chat.complete(&messages).await {
            Ok(report) if !report.trim().is_empty() => {
                tracing::info!(
                    materials = materials.len().min(REPORT_MAX_MATERIALS),
                    chars = report.chars().count(),
                    "Report generated"
                );
                report
            }
            Ok(_) => {
                Degradation::ReportDegraded { reason: "empty report".to_string() }.log();
                fallback_report(query, brief_summary)
            }
            Err(e) => {
                Degradation::ReportDegraded { reason: e.to_string() }.log();
                fallback_report(query, brief_summary)
            }
        }
    }

    /// Asks for a short topic summary. Degrades to an empty string.
    pub async fn brief_summary(&self, query: &str) -> String {
        let messages = [
            ChatMessage::system("Output only a brief summary."),
            ChatMessage::user(format!(
                "Write a summary of at most 100 characters about the topic: {query}. \
                 Use the same language as the topic."
            )),
        ];
        match self.chat.complete(&messages).await {
            Ok(summary) => summary.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Brief summary unavailable");
                String::new()
            }
        }
    }
}
