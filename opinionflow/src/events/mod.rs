//! Event sinks for pipeline runs.
//!
//! The pipeline itself only yields [`PipelineEvent`](crate::pipeline::PipelineEvent)s
//! on a stream. Sinks are the consumers the crate ships for forwarding that
//! stream to logs, memory or a line-oriented writer.

mod sink;

pub use sink::{CollectingEventSink, EventSink, JsonLinesEventSink, LoggingEventSink, NoOpEventSink};
