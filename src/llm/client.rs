//! Provider Adapter (§4.1): a uniform interface over OpenAI, Ollama, and
//! Anthropic, hiding each vendor's request/response shape and tool-calling
//! convention behind one trait.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::types::{OrchestratorError, Result, TokenUsage, ToolCall, ToolDescriptor};

/// A message as sent to or received from a provider. This is the wire shape
/// the Provider Adapter formats messages into — assistant messages carry
/// `tool_calls`, tool-result messages carry `tool_call_id` (§4.1).
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_call_id: Option<String>,
    /// Base64-encoded image bytes, attached to a user message (§4.1).
    pub image_base64: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            image_base64: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            image_base64: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            image_base64: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            image_base64: None,
        }
    }
}

/// Inference parameters, applied when the provider supports them.
#[derive(Debug, Clone, Default)]
pub struct ModelParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// Result of a non-streaming completion (§4.1: `Complete`).
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub message: ChatMessage,
    pub usage: TokenUsage,
    pub latency_ms: u64,
    pub finish_reason: String,
}

/// An incremental fragment of a streamed tool call; fragments for the same
/// `index` are concatenated by the caller until the stream ends.
#[derive(Debug, Clone)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments_fragment: Option<String>,
}

/// One event from a streamed completion.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    ContentDelta(String),
    ToolCallDelta(ToolCallFragment),
    /// Terminal event: always the last item the stream yields.
    Done {
        usage: TokenUsage,
        finish_reason: String,
    },
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Uniform interface every LLM vendor implements (§4.1, §6).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// One assistant message with optional tool calls; usage counters are
    /// always present (zero if the vendor doesn't report them). Fails with
    /// `ProviderUnavailable` on network/HTTP failure, `ProviderProtocol` on
    /// a malformed response.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &ModelParams,
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<LlmResponse>;

    /// Same request, streamed incrementally.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &ModelParams,
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<ChatStream>;

    /// Lightweight liveness probe, used to fail fast with
    /// `ProviderUnavailable` before committing to a full turn.
    async fn health_check(&self) -> Result<()>;

    fn name(&self) -> &'static str;
}

pub fn provider_unavailable(detail: impl std::fmt::Display) -> OrchestratorError {
    OrchestratorError::ProviderUnavailable(detail.to_string())
}

pub fn provider_protocol(detail: impl std::fmt::Display) -> OrchestratorError {
    OrchestratorError::ProviderProtocol(detail.to_string())
}
