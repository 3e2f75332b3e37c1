//! # Opinionflow
//!
//! A search-gated public-opinion report pipeline.
//!
//! A run takes a free-text topic and:
//!
//! - **Searches** through a provider proxy and filters non-article results
//! - **Gates** the results with a model verdict, refining the search once if needed
//! - **Fetches** full text for every candidate concurrently and sanitizes it
//! - **Reports** by asking a writer model for a structured Markdown report
//!
//! Progress is exposed as a lazy stream of [`pipeline::PipelineEvent`]s that
//! always ends with exactly one `final` or `error` event.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use opinionflow::prelude::*;
//!
//! let config = PipelineConfig::new("https://proxy.example.com/api/chat");
//! let pipeline = AnalysisPipeline::with_http(config)?;
//!
//! let mut events = Box::pin(pipeline.run("某品牌 召回"));
//! while let Some(event) = events.next().await {
//!     println!("{}", event.to_value());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod errors;
pub mod events;
pub mod fetch;
pub mod gate;
pub mod llm;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod proxy;
pub mod report;
pub mod sanitize;
pub mod search;
pub mod testing;
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{HttpConfig, PipelineConfig, ProxyConfig};
    pub use crate::errors::{Degradation, OpinionflowError, Result};
    pub use crate::events::{
        CollectingEventSink, EventSink, JsonLinesEventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::models::{FetchOutcome, GateVerdict, SearchOutcome, SearchResult};
    pub use crate::observability::{init_tracing, LogFormat, RunSummary};
    pub use crate::pipeline::{AnalysisPipeline, PipelineEvent, RunState, SearchMode};
    pub use crate::proxy::ProxyTransport;
    pub use crate::transport::{HttpReply, HttpTransport, Transport};
}
