//! The analysis run state machine.

use async_stream::stream;
use chrono::Utc;
use futures::{pin_mut, Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, Span};
use uuid::Uuid;

use super::events::{PipelineEvent, RunPlan, SearchMode};
use crate::config::PipelineConfig;
use crate::errors::Result;
use crate::events::EventSink;
use crate::fetch::FetchStage;
use crate::gate::SearchGate;
use crate::llm::ChatClient;
use crate::models::{ResultSet, SearchOutcome};
use crate::observability::RunSummary;
use crate::report::ReportGenerator;
use crate::search::SearchClient;
use crate::transport::{HttpTransport, Transport};

/// Search+gate passes allowed in one run: the first pass and one refinement.
pub const MAX_SEARCH_PASSES: usize = 2;

/// States a run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Announcing the plan.
    Planning,
    /// Running a search pass.
    Searching,
    /// Judging the latest pass.
    Gating,
    /// Building the refinement query.
    Refining,
    /// Fetching full text.
    Fetching,
    /// Writing the report.
    Reporting,
    /// Finished with a report.
    Final,
    /// Finished with an error.
    Error,
}

impl RunState {
    /// Returns true if the state ends the run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final | Self::Error)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Searching => write!(f, "searching"),
            Self::Gating => write!(f, "gating"),
            Self::Refining => write!(f, "refining"),
            Self::Fetching => write!(f, "fetching"),
            Self::Reporting => write!(f, "reporting"),
            Self::Final => write!(f, "final"),
            Self::Error => write!(f, "error"),
        }
    }
}

fn transition(span: &Span, state: &mut RunState, next: RunState) {
    span.in_scope(|| tracing::debug!(from = %state, to = %next, "Run state transition"));
    *state = next;
}

/// Picks the pass the report is built from: the latest non-empty pass,
/// else the first pass.
#[must_use]
pub fn select_pass(passes: &[SearchOutcome]) -> Option<&SearchOutcome> {
    passes
        .iter()
        .rev()
        .find(|p| !p.results.is_empty())
        .or_else(|| passes.first())
}

/// Results of the selected pass.
#[must_use]
pub fn select_materials(passes: &[SearchOutcome]) -> ResultSet {
    select_pass(passes).map(|p| p.results.clone()).unwrap_or_default()
}

/// Provider summary of the selected pass, if it is not blank.
#[must_use]
pub fn material_summary(passes: &[SearchOutcome]) -> Option<&str> {
    select_pass(passes)
        .map(|p| p.summary.trim())
        .filter(|s| !s.is_empty())
}

/// Orchestrates search, gate, fetch and report for one query per run.
///
/// Holds no per-run state; every call to [`AnalysisPipeline::run`] starts
/// an independent run.
#[derive(Clone)]
pub struct AnalysisPipeline {
    config: Arc<PipelineConfig>,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AnalysisPipeline {
    /// Creates a pipeline over the given transport.
    pub fn new(config: PipelineConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    /// Creates a pipeline over a `reqwest` transport.
    pub fn with_http(config: PipelineConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.http)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn chat(&self) -> ChatClient {
        ChatClient::new(
            Arc::clone(&self.transport),
            self.config.endpoint.trim(),
            self.config.model.clone(),
            self.config.temperature,
        )
    }

    /// Starts a run and returns its event stream.
    ///
    /// Nothing happens until the stream is polled. The stream always ends
    /// with exactly one `final` or `error` event.
    pub fn run(&self, query: impl Into<String>) -> impl Stream<Item = PipelineEvent> + Send + '_ {
        let query: String = query.into().trim().to_string();

        stream! {
            let run_id = Uuid::now_v7().to_string();
            let span = tracing::info_span!("analysis_run", run_id = %run_id, query = %query);
            let mut state = RunState::Planning;

            if query.is_empty() {
                transition(&span, &mut state, RunState::Error);
                yield PipelineEvent::error("Configuration error: query must not be empty");
                return;
            }
            let fetch_url = match self.config.validate().and_then(|()| self.config.fetch_url()) {
                Ok(url) => url,
                Err(e) => {
                    transition(&span, &mut state, RunState::Error);
                    yield PipelineEvent::error(e.to_string());
                    return;
                }
            };

            span.in_scope(|| tracing::info!("Analysis run started"));
            yield PipelineEvent::Planning {
                run_id: run_id.clone(),
                plan: RunPlan::default(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                started_at: Utc::now(),
            };

            let search = SearchClient::new(Arc::clone(&self.transport), Arc::clone(&self.config));
            let gate = SearchGate::new(self.chat());
            let mut passes: Vec<SearchOutcome> = Vec::with_capacity(MAX_SEARCH_PASSES);
            let mut search_query = query.clone();

            loop {
                transition(&span, &mut state, RunState::Searching);
                let refining = !passes.is_empty();
                yield PipelineEvent::Search {
                    mode: if refining { SearchMode::AiRecheck } else { SearchMode::Ai },
                    batch_count: passes.len() + 1,
                    query: search_query.clone(),
                };

                let outcome = match search.search(&search_query).instrument(span.clone()).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        let e = if refining { e.into_refine() } else { e };
                        span.in_scope(|| tracing::error!(error = %e, "Search pass failed"));
                        transition(&span, &mut state, RunState::Error);
                        yield PipelineEvent::error(e.to_string());
                        return;
                    }
                };
                yield PipelineEvent::Filter { accepted_this_round: outcome.results.len() };

                transition(&span, &mut state, RunState::Gating);
                let judged = gate.evaluate(&query, &outcome.results).instrument(span.clone()).await;
                passes.push(outcome);
                yield PipelineEvent::gate(passes.len(), &judged);

                if judged.verdict.ready || passes.len() >= MAX_SEARCH_PASSES {
                    break;
                }

                transition(&span, &mut state, RunState::Refining);
                search_query = judged.verdict.refinement_query(&query);
                span.in_scope(|| tracing::info!(refined = %search_query, "Refining search"));
            }

            transition(&span, &mut state, RunState::Fetching);
            let candidates = select_materials(&passes);
            let fetched = FetchStage::new(Arc::clone(&self.transport), fetch_url.as_str())
                .fetch_all(&candidates)
                .instrument(span.clone())
                .await;
            yield PipelineEvent::Fetch {
                success: fetched.success_count,
                fail: fetched.fail_count,
            };

            transition(&span, &mut state, RunState::Reporting);
            let writer = ReportGenerator::new(self.chat());
            let summary = match material_summary(&passes) {
                Some(summary) => summary.to_string(),
                None => writer.brief_summary(&query).instrument(span.clone()).await,
            };
            let detailed_report = writer
                .generate_report(&query, &summary, &fetched.cleaned)
                .instrument(span.clone())
                .await;

            transition(&span, &mut state, RunState::Final);
            span.in_scope(|| tracing::info!(materials = fetched.cleaned.len(), "Analysis run finished"));
            yield PipelineEvent::Final {
                summary,
                detailed_report,
                items: fetched.cleaned,
            };
        }
    }

    /// Drives a run to completion and collects every event.
    pub async fn run_to_end(&self, query: impl Into<String>) -> Vec<PipelineEvent> {
        self.run(query).collect().await
    }

    /// Drives a run, forwarding every event to `sink`, and returns the
    /// terminal event. Logs a [`RunSummary`] once the stream ends.
    pub async fn run_to_sink(&self, query: impl Into<String>, sink: &dyn EventSink) -> Option<PipelineEvent> {
        let events = self.run(query);
        pin_mut!(events);

        let mut summary = RunSummary::start();
        let mut terminal = None;
        while let Some(event) = events.next().await {
            summary.observe(&event);
            sink.emit(&event).await;
            if event.is_terminal() {
                terminal = Some(event);
            }
        }
        summary.log();
        terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::models::SearchResult;
    use crate::testing::{ScriptedTransport, ScriptedReply};
    use crate::transport::RequestKind;
    use pretty_assertions::assert_eq;

    const ENDPOINT: &str = "https://proxy.example.com/api/chat";

    fn refs(prefix: &str, n: usize) -> serde_json::Value {
        serde_json::Value::Array(
            (0..n)
                .map(|i| serde_json::json!({ "url": format!("https://{prefix}{i}.example.com/a"), "title": format!("{prefix} {i}") }))
                .collect(),
        )
    }

    fn search_reply(content: &str, references: serde_json::Value) -> ScriptedReply {
        ScriptedReply::json(serde_json::json!({
            "choices": [{ "message": { "content": content, "references": references } }]
        }))
    }

    fn tags(events: &[PipelineEvent]) -> Vec<&'static str> {
        events.iter().map(PipelineEvent::tag).collect()
    }

    fn pipeline(transport: &Arc<ScriptedTransport>) -> AnalysisPipeline {
        AnalysisPipeline::new(PipelineConfig::new(ENDPOINT), Arc::clone(transport) as Arc<dyn Transport>)
    }

    fn assert_single_terminal_last(events: &[PipelineEvent]) {
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1);
        assert!(events.last().is_some_and(PipelineEvent::is_terminal));
    }

    #[test]
    fn test_select_materials_prefers_latest_non_empty() {
        let first = SearchOutcome { results: vec![SearchResult::new("a", "https://a.com", "a.com")], summary: String::new() };
        let second = SearchOutcome { results: vec![SearchResult::new("b", "https://b.com", "b.com")], summary: String::new() };
        let empty = SearchOutcome::default();

        assert_eq!(select_materials(&[first.clone(), second.clone()]), second.results);
        assert_eq!(select_materials(&[first.clone(), empty.clone()]), first.results);
        assert!(select_materials(&[empty]).is_empty());
        assert!(select_materials(&[]).is_empty());
    }

    #[test]
    fn test_material_summary_follows_selected_pass() {
        let hit = |summary: &str| SearchOutcome {
            results: vec![SearchResult::new("a", "https://a.com", "a.com")],
            summary: summary.to_string(),
        };
        let miss = |summary: &str| SearchOutcome { results: vec![], summary: summary.to_string() };

        assert_eq!(material_summary(&[hit("first"), miss("second")]), Some("first"));
        assert_eq!(material_summary(&[miss("first"), hit("second")]), Some("second"));
        assert_eq!(material_summary(&[hit("first"), hit("  ")]), None);
        assert_eq!(material_summary(&[miss("only")]), Some("only"));
        assert_eq!(material_summary(&[]), None);
    }

    #[tokio::test]
    async fn test_ready_on_first_pass_skips_refinement() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on(RequestKind::Search, search_reply("摘要", refs("n", 3)))
                .on(RequestKind::Chat, ScriptedReply::chat(r#"{"ready": true, "confidence": 90, "reason": "enough"}"#))
                .on(RequestKind::Chat, ScriptedReply::chat("# 报告"))
                .fallback(RequestKind::Fetch, ScriptedReply::text("<p>全文</p>")),
        );

        let events = pipeline(&transport).run_to_end("测试").await;

        assert_eq!(tags(&events), vec!["planning", "search", "filter", "gate", "fetch", "final"]);
        assert_eq!(transport.count(RequestKind::Search), 1);
        assert_eq!(events[4], PipelineEvent::Fetch { success: 3, fail: 0 });
        let PipelineEvent::Final { summary, detailed_report, items } = &events[5] else {
            panic!("expected final");
        };
        assert_eq!(summary, "摘要");
        assert_eq!(detailed_report, "# 报告");
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.body == "全文"));
    }

    #[tokio::test]
    async fn test_not_ready_refines_once_with_recheck_query() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on(RequestKind::Search, search_reply("", refs("first", 2)))
                .on(RequestKind::Chat, ScriptedReply::chat(
                    r#"{"ready": false, "confidence": 30, "reason": "thin", "next_step_suggestion": {"search_query": "测试 官方 回应"}}"#,
                ))
                .on(RequestKind::Search, search_reply("second summary", refs("second", 4)))
                .on(RequestKind::Chat, ScriptedReply::chat(r#"{"ready": false, "confidence": 40, "reason": "still thin"}"#))
                .on(RequestKind::Chat, ScriptedReply::chat("# report"))
                .fallback(RequestKind::Fetch, ScriptedReply::text("body")),
        );

        let events = pipeline(&transport).run_to_end("测试").await;

        assert_eq!(
            tags(&events),
            vec!["planning", "search", "filter", "gate", "search", "filter", "gate", "fetch", "final"]
        );
        assert_eq!(transport.count(RequestKind::Search), 2);
        assert_eq!(
            events[4],
            PipelineEvent::Search { mode: SearchMode::AiRecheck, batch_count: 2, query: "测试 官方 回应".to_string() }
        );
        let searches = transport.bodies(RequestKind::Search);
        assert_eq!(searches[1]["messages"][0]["content"], "测试 官方 回应");

        let PipelineEvent::Final { summary, items, .. } = events.last().unwrap() else {
            panic!("expected final");
        };
        assert_eq!(summary, "second summary");
        assert!(items.iter().all(|i| i.href.contains("second")));
    }

    #[tokio::test]
    async fn test_summary_comes_from_material_pass() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on(RequestKind::Search, search_reply("first summary", refs("first", 2)))
                .on(RequestKind::Chat, ScriptedReply::chat(r#"{"ready": false, "confidence": 20, "reason": "thin"}"#))
                .on(RequestKind::Search, search_reply("summary without results", serde_json::json!([])))
                .on(RequestKind::Chat, ScriptedReply::chat(r#"{"ready": false, "confidence": 20, "reason": "thin"}"#))
                .on(RequestKind::Chat, ScriptedReply::chat("# report"))
                .fallback(RequestKind::Fetch, ScriptedReply::text("body")),
        );

        let events = pipeline(&transport).run_to_end("测试").await;

        let PipelineEvent::Final { summary, items, .. } = events.last().unwrap() else {
            panic!("expected final");
        };
        assert_eq!(summary, "first summary");
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.href.contains("first")));
        assert_eq!(transport.count(RequestKind::Chat), 3);
    }

    #[tokio::test]
    async fn test_gate_network_error_takes_refinement_path() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on(RequestKind::Search, search_reply("s", refs("a", 2)))
                .on(RequestKind::Chat, ScriptedReply::network_error("gate unreachable"))
                .on(RequestKind::Search, search_reply("s2", refs("b", 2)))
                .on(RequestKind::Chat, ScriptedReply::network_error("gate unreachable"))
                .on(RequestKind::Chat, ScriptedReply::chat("# r"))
                .fallback(RequestKind::Fetch, ScriptedReply::text("t")),
        );

        let events = pipeline(&transport).run_to_end("测试").await;

        assert!(!events.iter().any(|e| matches!(e, PipelineEvent::Error { .. })));
        assert!(matches!(events[3], PipelineEvent::Gate { ready: false, confidence: 50, degraded: true, .. }));
        assert_eq!(
            events[4],
            PipelineEvent::Search { mode: SearchMode::AiRecheck, batch_count: 2, query: "测试".to_string() }
        );
        assert_eq!(transport.count(RequestKind::Search), 2);
        assert_single_terminal_last(&events);
    }

    #[tokio::test]
    async fn test_first_search_failure_is_single_error() {
        let transport = Arc::new(
            ScriptedTransport::new().on(RequestKind::Search, ScriptedReply::status(500, "internal error")),
        );

        let events = pipeline(&transport).run_to_end("测试").await;

        assert_eq!(tags(&events), vec!["planning", "search", "error"]);
        let PipelineEvent::Error { message } = &events[2] else {
            panic!("expected error");
        };
        assert!(message.contains("500"));
        assert_eq!(transport.count(RequestKind::Chat), 0);
    }

    #[tokio::test]
    async fn test_refine_search_failure_is_fatal() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on(RequestKind::Search, search_reply("s", refs("a", 1)))
                .on(RequestKind::Chat, ScriptedReply::chat(r#"{"ready": false, "confidence": 10, "reason": "none"}"#))
                .on(RequestKind::Search, ScriptedReply::status(502, "bad gateway")),
        );

        let events = pipeline(&transport).run_to_end("测试").await;

        assert_eq!(tags(&events), vec!["planning", "search", "filter", "gate", "search", "error"]);
        let PipelineEvent::Error { message } = events.last().unwrap() else {
            panic!("expected error");
        };
        assert!(message.starts_with("Refine search failed"));
        assert_eq!(transport.count(RequestKind::Fetch), 0);
    }

    #[tokio::test]
    async fn test_all_fetches_fail_still_final_with_fallback() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on(RequestKind::Search, search_reply("只有摘要", refs("a", 3)))
                .on(RequestKind::Chat, ScriptedReply::chat(r#"{"ready": true, "confidence": 80, "reason": "ok"}"#))
                .fallback(RequestKind::Chat, ScriptedReply::network_error("network down"))
                .fallback(RequestKind::Fetch, ScriptedReply::network_error("network down")),
        );

        let events = pipeline(&transport).run_to_end("测试").await;

        assert_eq!(events[events.len() - 2], PipelineEvent::Fetch { success: 0, fail: 3 });
        let PipelineEvent::Final { summary, detailed_report, items } = events.last().unwrap() else {
            panic!("expected final");
        };
        assert!(items.is_empty());
        assert_eq!(summary, "只有摘要");
        assert_eq!(detailed_report, &crate::report::fallback_report("测试", "只有摘要"));
    }

    #[tokio::test]
    async fn test_empty_results_still_gated_and_reported() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .fallback(RequestKind::Search, search_reply("", serde_json::json!([])))
                .on(RequestKind::Chat, ScriptedReply::chat("not json"))
                .on(RequestKind::Chat, ScriptedReply::chat("still not json"))
                .on(RequestKind::Chat, ScriptedReply::chat("brief"))
                .on(RequestKind::Chat, ScriptedReply::chat("# r")),
        );

        let events = pipeline(&transport).run_to_end("测试").await;

        assert_eq!(transport.count(RequestKind::Search), MAX_SEARCH_PASSES);
        assert_eq!(transport.count(RequestKind::Fetch), 0);
        let PipelineEvent::Final { summary, detailed_report, .. } = events.last().unwrap() else {
            panic!("expected final");
        };
        assert_eq!(summary, "brief");
        assert_eq!(detailed_report, "# r");
    }

    #[tokio::test]
    async fn test_empty_query_errors_without_network() {
        let transport = Arc::new(ScriptedTransport::new());
        let events = pipeline(&transport).run_to_end("   ").await;

        assert_eq!(tags(&events), vec!["error"]);
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_endpoint_errors_without_network() {
        let transport = Arc::new(ScriptedTransport::new());
        let pipeline = AnalysisPipeline::new(PipelineConfig::default(), Arc::clone(&transport) as Arc<dyn Transport>);

        let events = pipeline.run_to_end("测试").await;

        assert_eq!(tags(&events), vec!["error"]);
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let transport = Arc::new(ScriptedTransport::new());
        let pipeline = pipeline(&transport);
        let stream = pipeline.run("测试");
        assert_eq!(transport.total_calls(), 0);
        drop(stream);
    }

    #[derive(Clone, Default)]
    struct SpanRecorder {
        inside: Arc<parking_lot::Mutex<usize>>,
        outside: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl<S> tracing_subscriber::Layer<S> for SpanRecorder
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        fn on_event(&self, event: &tracing::Event<'_>, ctx: tracing_subscriber::layer::Context<'_, S>) {
            if !event.metadata().target().starts_with("opinionflow") {
                return;
            }
            let in_run = ctx
                .event_scope(event)
                .is_some_and(|mut scope| scope.any(|span| span.name() == "analysis_run"));
            if in_run {
                *self.inside.lock() += 1;
            } else {
                self.outside.lock().push(event.metadata().name().to_string());
            }
        }
    }

    #[tokio::test]
    async fn test_run_logs_stay_inside_run_span() {
        use tracing_subscriber::layer::SubscriberExt;

        let recorder = SpanRecorder::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(recorder.clone()));

        let transport = Arc::new(
            ScriptedTransport::new()
                .on(RequestKind::Search, search_reply("", refs("a", 2)))
                .on(RequestKind::Chat, ScriptedReply::network_error("gate unreachable"))
                .on(RequestKind::Search, search_reply("", refs("b", 2)))
                .on(RequestKind::Chat, ScriptedReply::chat("not json"))
                .fallback(RequestKind::Chat, ScriptedReply::network_error("writer unreachable"))
                .on(RequestKind::Fetch, ScriptedReply::network_error("reset"))
                .fallback(RequestKind::Fetch, ScriptedReply::text("t")),
        );
        pipeline(&transport).run_to_end("测试").await;
        pipeline(&transport).run_to_end("  ").await;

        assert!(recorder.outside.lock().is_empty(), "{:?}", recorder.outside.lock());
        assert!(*recorder.inside.lock() > 0);
    }

    #[tokio::test]
    async fn test_run_to_sink_forwards_events() {
        let transport = Arc::new(
            ScriptedTransport::new().on(RequestKind::Search, ScriptedReply::status(500, "down")),
        );
        let sink = CollectingEventSink::new();

        let terminal = pipeline(&transport).run_to_sink("测试", &sink).await;

        assert!(matches!(terminal, Some(PipelineEvent::Error { .. })));
        assert_eq!(sink.tags(), vec!["planning", "search", "error"]);
    }

    #[tokio::test]
    async fn test_run_over_http() {
        use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let chat = |content: &str| {
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "choices": [{ "message": { "content": content } }] }))
        };
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({ "service": "baidu" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "summary", "references": [
                    { "url": format!("{}/a/1", server.uri()), "title": "one" },
                    { "url": "https://image.baidu.com/p/1", "title": "pic" }
                ]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_string_contains("Respond with ONLY a JSON object"))
            .respond_with(chat(r#"{"ready": true, "confidence": 88, "reason": "ok"}"#))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_string_contains("seven sections"))
            .respond_with(chat("# Report over http"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/fetch"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<article>Full text</article>"))
            .expect(1)
            .mount(&server)
            .await;

        let config = PipelineConfig::new(format!("{}/api/chat", server.uri()));
        let pipeline = AnalysisPipeline::with_http(config).unwrap();
        let events = pipeline.run_to_end("topic").await;

        assert_eq!(tags(&events), vec!["planning", "search", "filter", "gate", "fetch", "final"]);
        assert_eq!(events[2], PipelineEvent::Filter { accepted_this_round: 1 });
        let PipelineEvent::Final { detailed_report, items, .. } = events.last().unwrap() else {
            panic!("expected final");
        };
        assert_eq!(detailed_report, "# Report over http");
        assert_eq!(items[0].body, "Full text");
    }

    #[tokio::test]
    async fn test_runs_are_independent() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .fallback(RequestKind::Search, search_reply("s", refs("a", 1)))
                .fallback(RequestKind::Chat, ScriptedReply::chat(r#"{"ready": true, "confidence": 70, "reason": "ok"}"#))
                .fallback(RequestKind::Fetch, ScriptedReply::text("x")),
        );
        let pipeline = pipeline(&transport);

        let first = pipeline.run_to_end("测试").await;
        let second = pipeline.run_to_end("测试").await;

        assert_eq!(tags(&first), tags(&second));
        assert_single_terminal_last(&first);
        assert_single_terminal_last(&second);
    }
}
