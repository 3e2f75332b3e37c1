//! Testing utilities for opinionflow pipelines.
//!
//! This module provides a scripted [`Transport`](crate::transport::Transport)
//! that answers search, chat and fetch requests from per-kind queues and
//! records every call it sees.

mod scripted;

pub use scripted::{RecordedCall, ScriptedReply, ScriptedTransport};
