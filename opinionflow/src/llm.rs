//! Chat-completion calls through the proxy.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{OpinionflowError, Result};
use crate::models::ChatMessage;
use crate::transport::Transport;

/// Chat completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    /// Model name.
    pub model: &'a str,
    /// Conversation.
    pub messages: &'a [ChatMessage],
    /// Sampling temperature.
    pub temperature: f64,
    /// Always false.
    pub stream: bool,
}

/// Chat completion response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    /// Completion choices.
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

/// One completion choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChoice {
    /// The generated message.
    #[serde(default)]
    pub message: ChoiceMessage,
}

/// Message inside a choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceMessage {
    /// Generated text.
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Content of the first choice.
    #[must_use]
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.message.content.as_deref())
    }
}

/// Client for the chat-completion endpoint.
#[derive(Clone)]
pub struct ChatClient {
    transport: Arc<dyn Transport>,
    endpoint: String,
    model: String,
    temperature: f64,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Creates a chat client.
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        temperature: f64,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            model: model.into(),
            temperature,
        }
    }

    /// Sends `messages` and returns the first choice's content.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream: false,
        };
        let body = serde_json::to_value(&request)?;

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            prompt_chars = messages.iter().map(|m| m.content.chars().count()).sum::<usize>(),
            "Sending chat completion"
        );

        let reply = self.transport.post_json(&self.endpoint, &body).await?.into_success()?;
        let parsed: ChatResponse = serde_json::from_str(&reply.body)?;
        parsed
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| OpinionflowError::Serialization("chat response has no content".to_string()))
    }
}
