//! One wide record per run, folded from its event stream.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::pipeline::PipelineEvent;

/// How a run ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// No terminal event seen yet.
    #[default]
    Incomplete,
    /// Ended with `final`.
    Completed,
    /// Ended with `error`.
    Failed,
}

/// Aggregated view of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run identifier from the `planning` event.
    pub run_id: Option<String>,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Search passes started.
    pub search_passes: usize,
    /// Results accepted across all passes.
    pub accepted: usize,
    /// Confidence of the last gate verdict.
    pub last_confidence: Option<u8>,
    /// Gate verdicts that were substituted defaults.
    pub degraded_gates: usize,
    /// Successful fetches.
    pub fetch_success: usize,
    /// Failed fetches.
    pub fetch_fail: usize,
    /// Materials handed to the report writer.
    pub materials: usize,
    /// Error message, if the run failed.
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    #[serde(skip)]
    started: Option<Instant>,
}

impl RunSummary {
    /// Creates an empty summary and starts its clock.
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Some(Instant::now()),
            ..Self::default()
        }
    }

    /// Folds a whole event list.
    #[must_use]
    pub fn from_events(events: &[PipelineEvent]) -> Self {
        let mut summary = Self::default();
        for event in events {
            summary.observe(event);
        }
        summary
    }

    /// Folds one event into the summary.
    pub fn observe(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Planning { run_id, .. } => self.run_id = Some(run_id.clone()),
            PipelineEvent::Search { .. } => self.search_passes += 1,
            PipelineEvent::Filter { accepted_this_round } => self.accepted += accepted_this_round,
            PipelineEvent::Gate { confidence, degraded, .. } => {
                self.last_confidence = Some(*confidence);
                if *degraded {
                    self.degraded_gates += 1;
                }
            }
            PipelineEvent::Fetch { success, fail } => {
                self.fetch_success = *success;
                self.fetch_fail = *fail;
            }
            PipelineEvent::Final { items, .. } => {
                self.materials = items.len();
                self.finish(RunOutcome::Completed);
            }
            PipelineEvent::Error { message } => {
                self.error = Some(message.clone());
                self.finish(RunOutcome::Failed);
            }
            PipelineEvent::Unknown => {}
        }
    }

    fn finish(&mut self, outcome: RunOutcome) {
        self.outcome = outcome;
        if let Some(started) = self.started {
            self.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        }
    }

    /// Logs the summary as one info-level record.
    pub fn log(&self) {
        tracing::info!(
            run_id = self.run_id.as_deref().unwrap_or_default(),
            outcome = ?self.outcome,
            search_passes = self.search_passes,
            accepted = self.accepted,
            degraded_gates = self.degraded_gates,
            fetch_success = self.fetch_success,
            fetch_fail = self.fetch_fail,
            materials = self.materials,
            error = self.error.as_deref().unwrap_or_default(),
            duration_ms = self.duration_ms,
            "Run summary"
        );
    }
}
