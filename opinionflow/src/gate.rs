//! Search gate: asks the model whether the collected results are enough.
//!
//! The gate is advisory. A failed call or an undecodable answer collapses
//! to [`GateVerdict::default`], which recommends refinement.

use serde_json::Value;
use std::fmt::Write as _;

use crate::errors::Degradation;
use crate::llm::ChatClient;
use crate::models::{truncate_chars, ChatMessage, GateVerdict, SearchResult};

/// Results beyond this index are not shown to the gate.
pub const GATE_MAX_RESULTS: usize = 10;
/// Characters of body shown per result.
pub const GATE_SNIPPET_CHARS: usize = 200;
/// Keywords kept from the suggested query.
pub const MAX_REFINE_KEYWORDS: usize = 3;

const GATE_SYSTEM_PROMPT: &str = "You are a research editor for public-opinion analysis. \
You judge whether a set of search results is sufficient to write a factual report on a topic.";

const GATE_INSTRUCTION: &str = r#"Judge whether the results above are sufficient to write a public-opinion report on the topic.
Respond with ONLY a JSON object and nothing else, in exactly this shape:
{"ready": true or false, "confidence": integer 0-100, "reason": "short explanation", "next_step_suggestion": {"search_query": "a better search query if not ready"}}"#;

/// Builds the gate prompt for `query` and the first results.
#[must_use]
pub fn build_gate_messages(query: &str, results: &[SearchResult]) -> Vec<ChatMessage> {
    let mut prompt = format!("Topic: {query}\n\nSearch results ({} total):\n", results.len());
    if results.is_empty() {
        prompt.push_str("(none)\n");
    }
    for (i, result) in results.iter().take(GATE_MAX_RESULTS).enumerate() {
        let _ = writeln!(prompt, "[{}] {} ({})", i + 1, result.title, result.source);
        let snippet = truncate_chars(&result.body, GATE_SNIPPET_CHARS);
        if !snippet.is_empty() {
            let _ = writeln!(prompt, "    {snippet}");
        }
    }
    prompt.push('\n');
    prompt.push_str(GATE_INSTRUCTION);

    vec![ChatMessage::system(GATE_SYSTEM_PROMPT), ChatMessage::user(prompt)]
}

/// Result of decoding the model's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictDecode {
    /// A well-formed verdict.
    Ok(GateVerdict),
    /// Valid JSON that does not have the verdict shape.
    Invalid(String),
    /// Not JSON at all.
    Malformed(String),
}

impl VerdictDecode {
    /// Collapses every non-`Ok` case to the default verdict.
    #[must_use]
    pub fn into_verdict(self) -> (GateVerdict, Option<Degradation>) {
        match self {
            Self::Ok(verdict) => (verdict, None),
            Self::Invalid(reason) | Self::Malformed(reason) => {
                (GateVerdict::default(), Some(Degradation::GateDegraded { reason }))
            }
        }
    }
}

/// Removes Markdown code-fence markers and surrounding prose.
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
        text = rest.trim();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim();
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Decodes the model's answer into a verdict.
#[must_use]
pub fn decode_verdict(raw: &str) -> VerdictDecode {
    let body = strip_code_fences(raw);
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return VerdictDecode::Malformed(format!("not JSON: {e}")),
    };
    let Some(object) = value.as_object() else {
        return VerdictDecode::Invalid("verdict is not a JSON object".to_string());
    };

    let Some(ready) = object.get("ready").and_then(Value::as_bool) else {
        return VerdictDecode::Invalid("missing boolean 'ready'".to_string());
    };
    let Some(confidence) = object.get("confidence").and_then(as_confidence) else {
        return VerdictDecode::Invalid("missing numeric 'confidence'".to_string());
    };
    let Some(reasons) = object.get("reason").and_then(as_reasons) else {
        return VerdictDecode::Invalid("missing 'reason'".to_string());
    };

    let suggested = object
        .get("next_step_suggestion")
        .and_then(|s| s.get("search_query"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    let refine_keywords = suggested
        .split_whitespace()
        .take(MAX_REFINE_KEYWORDS)
        .map(str::to_string)
        .collect();

    VerdictDecode::Ok(GateVerdict {
        ready,
        confidence,
        reasons,
        refine_keywords,
        recheck_query: suggested.to_string(),
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_confidence(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    Some(number.round().clamp(0.0, 100.0) as u8)
}

fn as_reasons(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.trim().to_string()]),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        _ => None,
    }
}

/// Verdict plus the degradation that produced it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    /// The verdict the pipeline acts on.
    pub verdict: GateVerdict,
    /// Set when the verdict is the default substitute.
    pub degradation: Option<Degradation>,
}

/// Runs the quality judgment.
#[derive(Debug, Clone)]
pub struct SearchGate {
    chat: ChatClient,
}

impl SearchGate {
    /// Creates a gate that asks through `chat`.
    #[must_use]
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }

    /// Judges `results` for `query`. Never fails.
    pub async fn judge(&self, query: &str, results: &[SearchResult]) -> GateVerdict {
        self.evaluate(query, results).await.verdict
    }

    /// Judges `results` and reports whether the verdict was substituted.
    pub async fn evaluate(&self, query: &str, results: &[SearchResult]) -> GateOutcome {
        let messages = build_gate_messages(query, results);
        let decoded = match self.chat.complete(&messages).await {
            Ok(raw) => decode_verdict(&raw),
            Err(e) => VerdictDecode::Malformed(format!("gate call failed: {e}")),
        };
        let (verdict, degradation) = decoded.into_verdict();
        if let Some(d) = &degradation {
            d.log();
        }
        tracing::info!(
            ready = verdict.ready,
            confidence = verdict.confidence,
            refine_keywords = ?verdict.refine_keywords,
            "Gate verdict"
        );
        GateOutcome { verdict, degradation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OpinionflowError;
    use crate::transport::{HttpReply, MockTransport};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn chat_reply(content: &str) -> HttpReply {
        HttpReply::ok(
            serde_json::json!({ "choices": [{ "message": { "content": content } }] }).to_string(),
        )
    }

    fn gate(mock: MockTransport) -> SearchGate {
        SearchGate::new(ChatClient::new(Arc::new(mock), "https://p.example.com/api/chat", "m", 0.7))
    }

    #[test]
    fn test_prompt_limits_results_and_snippets() {
        let results: Vec<SearchResult> = (0..12)
            .map(|i| {
                SearchResult::new(format!("title-{i}"), format!("https://e{i}.com"), format!("e{i}.com"))
                    .with_body("x".repeat(500))
            })
            .collect();
        let messages = build_gate_messages("topic", &results);
        let prompt = &messages[1].content;

        assert!(prompt.contains("[10] title-9"));
        assert!(!prompt.contains("title-10"));
        assert!(prompt.contains(&"x".repeat(200)));
        assert!(!prompt.contains(&"x".repeat(201)));
        assert!(prompt.contains("ONLY a JSON object"));
    }

    #[test]
    fn test_prompt_for_empty_results() {
        let messages = build_gate_messages("topic", &[]);
        assert!(messages[1].content.contains("(none)"));
    }

    #[test]
    fn test_decode_well_formed() {
        let raw = r#"{"ready": false, "confidence": 35, "reason": "too few sources",
            "next_step_suggestion": {"search_query": "事件 官方 通报 最新 进展"}}"#;
        let VerdictDecode::Ok(verdict) = decode_verdict(raw) else {
            panic!("expected Ok");
        };
        assert_eq!(
            verdict,
            GateVerdict {
                ready: false,
                confidence: 35,
                reasons: vec!["too few sources".to_string()],
                refine_keywords: vec!["事件".to_string(), "官方".to_string(), "通报".to_string()],
                recheck_query: "事件 官方 通报 最新 进展".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_strips_fences() {
        let raw = "```json\n{\"ready\": true, \"confidence\": 90, \"reason\": [\"enough\", \"\"]}\n```";
        let VerdictDecode::Ok(verdict) = decode_verdict(raw) else {
            panic!("expected Ok");
        };
        assert!(verdict.ready);
        assert_eq!(verdict.confidence, 90);
        assert_eq!(verdict.reasons, vec!["enough".to_string()]);
        assert!(verdict.recheck_query.is_empty());
    }

    #[test]
    fn test_decode_with_surrounding_prose() {
        let raw = "Here is my verdict: {\"ready\": true, \"confidence\": \"88%\", \"reason\": \"ok\"} thanks";
        assert!(matches!(decode_verdict(raw), VerdictDecode::Ok(v) if v.confidence == 88));
    }

    #[test]
    fn test_decode_clamps_confidence() {
        let raw = r#"{"ready": true, "confidence": 240, "reason": "x"}"#;
        assert!(matches!(decode_verdict(raw), VerdictDecode::Ok(v) if v.confidence == 100));
        let raw = r#"{"ready": true, "confidence": -3, "reason": "x"}"#;
        assert!(matches!(decode_verdict(raw), VerdictDecode::Ok(v) if v.confidence == 0));
    }

    #[test]
    fn test_malformed_and_invalid_collapse_to_default() {
        let cases = [
            "I think it is ready.",
            "",
            "[1, 2, 3]",
            r#"{"confidence": 80, "reason": "x"}"#,
            r#"{"ready": "yes", "confidence": 80, "reason": "x"}"#,
            r#"{"ready": true, "reason": "x"}"#,
            r#"{"ready": true, "confidence": 80}"#,
            "```json\n{\"ready\": tru\n```",
        ];
        for raw in cases {
            let decoded = decode_verdict(raw);
            assert!(!matches!(decoded, VerdictDecode::Ok(_)), "decoded {raw:?}");
            let (verdict, degradation) = decoded.into_verdict();
            assert_eq!(verdict, GateVerdict::default());
            assert!(matches!(degradation, Some(Degradation::GateDegraded { .. })));
        }
    }

    #[test]
    fn test_decode_kinds() {
        assert!(matches!(decode_verdict("nope"), VerdictDecode::Malformed(_)));
        assert!(matches!(decode_verdict("{\"ready\": 1}"), VerdictDecode::Invalid(_)));
    }

    #[tokio::test]
    async fn test_judge_ready() {
        let mut mock = MockTransport::new();
        mock.expect_post_json()
            .times(1)
            .returning(|_, _| Ok(chat_reply(r#"{"ready": true, "confidence": 90, "reason": "good"}"#)));

        let verdict = gate(mock).judge("q", &[]).await;
        assert!(verdict.ready);
        assert_eq!(verdict.confidence, 90);
    }

    #[tokio::test]
    async fn test_judge_network_error_degrades() {
        let mut mock = MockTransport::new();
        mock.expect_post_json()
            .returning(|_, _| Err(OpinionflowError::Transport("unreachable".to_string())));

        let outcome = gate(mock).evaluate("q", &[]).await;
        assert_eq!(outcome.verdict, GateVerdict::default());
        assert!(outcome.degradation.is_some());
    }

    #[tokio::test]
    async fn test_judge_error_status_degrades() {
        let mut mock = MockTransport::new();
        mock.expect_post_json()
            .returning(|_, _| Ok(HttpReply::new(503, "overloaded")));

        let verdict = gate(mock).judge("q", &[]).await;
        assert!(!verdict.ready);
        assert_eq!(verdict.reasons, vec!["no verdict obtained".to_string()]);
    }
}
