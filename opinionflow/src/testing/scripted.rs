//! Scripted transport for driving whole runs without a network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use crate::errors::{OpinionflowError, Result};
use crate::transport::{HttpReply, RequestKind, Transport};

/// One canned answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// An HTTP reply with any status.
    Reply(HttpReply),
    /// A network-level failure.
    NetworkError(String),
}

impl ScriptedReply {
    /// A 200 reply carrying `value` as JSON.
    #[must_use]
    pub fn json(value: serde_json::Value) -> Self {
        Self::Reply(HttpReply::ok(value.to_string()))
    }

    /// A 200 chat completion whose first choice says `content`.
    #[must_use]
    pub fn chat(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::json(serde_json::json!({ "choices": [{ "message": { "content": content } }] }))
    }

    /// A 200 reply with a raw text body.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::Reply(HttpReply::ok(body))
    }

    /// A reply with the given status.
    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Reply(HttpReply::new(status, body))
    }

    /// A network failure.
    #[must_use]
    pub fn network_error(message: impl Into<String>) -> Self {
        Self::NetworkError(message.into())
    }

    fn into_result(self) -> Result<HttpReply> {
        match self {
            Self::Reply(reply) => Ok(reply),
            Self::NetworkError(message) => Err(OpinionflowError::Transport(message)),
        }
    }
}

/// A request seen by the scripted transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// How the body was classified.
    pub kind: RequestKind,
    /// Target URL.
    pub url: String,
    /// Request body.
    pub body: serde_json::Value,
}

#[derive(Debug, Default)]
struct Script {
    queued: VecDeque<ScriptedReply>,
    fallback: Option<ScriptedReply>,
}

/// A transport answering from per-[`RequestKind`] queues.
///
/// Queued replies are consumed in order; once a queue is empty the kind's
/// fallback answers every further call. A call with neither fails with a
/// transport error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<RequestKind, Script>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for the next call of `kind`.
    #[must_use]
    pub fn on(self, kind: RequestKind, reply: ScriptedReply) -> Self {
        self.scripts.lock().entry(kind).or_default().queued.push_back(reply);
        self
    }

    /// Sets the reply used once the queue for `kind` is empty.
    #[must_use]
    pub fn fallback(self, kind: RequestKind, reply: ScriptedReply) -> Self {
        self.scripts.lock().entry(kind).or_default().fallback = Some(reply);
        self
    }

    /// Returns every recorded call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls of `kind`.
    #[must_use]
    pub fn count(&self, kind: RequestKind) -> usize {
        self.calls.lock().iter().filter(|c| c.kind == kind).count()
    }

    /// Returns the request bodies of `kind`, in order.
    #[must_use]
    pub fn bodies(&self, kind: RequestKind) -> Vec<serde_json::Value> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.body.clone())
            .collect()
    }

    /// Returns the total number of calls.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Clears recorded calls, leaving the script intact.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    fn next_reply(&self, kind: RequestKind) -> Option<ScriptedReply> {
        let mut scripts = self.scripts.lock();
        let script = scripts.get_mut(&kind)?;
        script.queued.pop_front().or_else(|| script.fallback.clone())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply> {
        let kind = RequestKind::classify(body);
        self.calls.lock().push(RecordedCall {
            kind,
            url: url.to_string(),
            body: body.clone(),
        });

        match self.next_reply(kind) {
            Some(reply) => reply.into_result(),
            None => Err(OpinionflowError::Transport(format!("no scripted reply for {kind:?} request"))),
        }
    }
}
