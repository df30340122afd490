//! Core data model for the conversational agent orchestrator.
//!
//! Covers the conversation/message/tool-call entities (data model), the
//! error taxonomy and streaming chunk contract (external interfaces), and
//! the thin request/response DTOs that cross the HTTP boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============= Conversation / Message data model =============

/// A conversation thread. Never implicitly destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Running consolidated summary, recomputed when the unsummarized gap reaches 20.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Highest `sequence_number` folded into `summary` so far.
    pub last_summarized_seq: i64,
}

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message. Messages are append-only; `sequence_number` is strictly
/// increasing with no gaps within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    /// Present on assistant messages that requested tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Present on role=tool messages; must match a prior assistant tool call id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub sequence_number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Computed asynchronously after persistence; absent until then.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new_user(conversation_id: impl Into<String>, content: impl Into<String>, sequence_number: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: MessageRole::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            sequence_number,
            prompt_tokens: None,
            completion_tokens: None,
            model: None,
            latency_ms: None,
            finish_reason: None,
            embedding: None,
            created_at: Utc::now(),
        }
    }
}

/// A request to call a tool, as emitted by the Provider Adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Result from executing a tool, ready to be persisted as a role=tool message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

// ============= Memory =============

/// A fact the Memory Composer recalls about a user, read every turn and
/// updated only out-of-band. Kept as the teacher's richer
/// category/key/value/confidence representation (see DESIGN.md) rather than
/// the spec's minimal content-plus-context shape: a representation choice,
/// not a scope change, since it renders down to the same prompt bullets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFact {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub fact_key: String,
    pub fact_value: String,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// A user preference entry, stored alongside facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    pub category: String,
    pub key: String,
    pub value: String,
    pub confidence: f32,
}

/// Aggregate of everything the Memory Composer knows about a user, prior to
/// prompt formatting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMemory {
    pub user_id: String,
    pub preferences: Vec<Preference>,
    pub facts: Vec<MemoryFact>,
}

// ============= Tools =============

/// Where a tool's implementation lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolOrigin {
    Local,
    RemoteServer(String),
}

/// A tool the registry knows about, whether local or discovered from a
/// remote tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
    pub origin: ToolOrigin,
}

// ============= Classifier / Planner =============

/// Conversational complexity, as emitted by the Classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complexity {
    Simple,
    Complex,
}

/// Default intent category used when the classifier is bypassed or its
/// output can't be parsed.
pub const GENERAL_INTENT: &str = "GENERAL";

/// Classifier output. Intent is a dynamic category name rather than a fixed
/// enum, since the Tool Registry's category list (and therefore the set of
/// intents worth distinguishing) is derived from whatever tools are
/// registered, not fixed at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: String,
    pub complexity: Complexity,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            intent: GENERAL_INTENT.to_string(),
            complexity: Complexity::Simple,
        }
    }
}

/// A single step of a Planner-produced plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub index: usize,
    pub description: String,
}

// ============= Streaming contract (§6) =============

/// Token usage, always present on a completion (zero fields if unknown).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// One chunk of a streamed turn. `done=true` is always the terminal chunk;
/// no further chunks follow it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Chunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub done: bool,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Chunk {
    pub fn content(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            conversation_id: conversation_id.into(),
            ..Default::default()
        }
    }

    pub fn status(conversation_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            conversation_id: conversation_id.into(),
            ..Default::default()
        }
    }

    pub fn done(conversation_id: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            usage: Some(usage),
            done: true,
            conversation_id: conversation_id.into(),
            ..Default::default()
        }
    }

    /// A single terminal error chunk; no `done=true` chunk follows it (§7).
    pub fn error(conversation_id: impl Into<String>, category: &'static str, detail: impl Into<String>) -> Self {
        Self {
            error: Some(format!("{category}: {}", detail.into())),
            conversation_id: conversation_id.into(),
            ..Default::default()
        }
    }
}

// ============= API request/response DTOs =============

/// Request payload for the chat endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Kind of attachment on an inbound turn; drives the orchestrator's model
/// switch (image) or transcription-injection (audio/video) behavior (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub kind: AttachmentKind,
    /// Base64-encoded bytes for images; already-transcribed text for audio/video.
    pub content: String,
}

/// Summary row for the conversation-listing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConversationSummaryDto {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Conversation> for ConversationSummaryDto {
    fn from(c: &Conversation) -> Self {
        Self {
            id: c.id.clone(),
            title: c.title.clone(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

// ============= Error taxonomy (§7) =============

/// The orchestrator's error taxonomy. Two disjoint subsets at the call
/// boundary: recovered locally (the turn continues) and surfaced as a
/// single terminal error chunk (the turn ends). See `is_recoverable`.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("provider protocol error: {0}")]
    ProviderProtocol(String),
    #[error("tool timed out: {0}")]
    ToolTimeout(String),
    #[error("tool crashed: {0}")]
    ToolCrash(String),
    #[error("tool protocol error: {0}")]
    ToolProtocol(String),
    #[error("tool error: {0}")]
    ToolError(String),
    #[error("unknown tool: {0}")]
    ToolUnknown(String),
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),
    #[error("summary failed: {0}")]
    SummaryFailed(String),
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),
    #[error("repository failed: {0}")]
    RepositoryFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl OrchestratorError {
    /// True for the set recovered locally (the turn continues); false for
    /// the set surfaced as a single terminal error chunk (§7).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::ToolTimeout(_)
                | OrchestratorError::ToolCrash(_)
                | OrchestratorError::ToolProtocol(_)
                | OrchestratorError::ToolError(_)
                | OrchestratorError::ToolUnknown(_)
                | OrchestratorError::EmbeddingFailed(_)
                | OrchestratorError::SummaryFailed(_)
                | OrchestratorError::CacheUnavailable(_)
        )
    }

    /// Short category string for the user-visible error chunk (§7).
    pub fn category(&self) -> &'static str {
        match self {
            OrchestratorError::ProviderUnavailable(_) => "provider_unavailable",
            OrchestratorError::InvalidRequest(_) => "bad_request",
            _ => "internal",
        }
    }

    /// Format a recovered tool failure as the synthetic role=tool message
    /// content the executor appends (§4.3, §4.6: `Error executing <name>: …`).
    pub fn as_tool_message(&self, tool_name: &str) -> String {
        format!("Error executing {tool_name}: {self}")
    }
}

impl axum::response::IntoResponse for OrchestratorError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            OrchestratorError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            OrchestratorError::ProviderUnavailable(_) => axum::http::StatusCode::BAD_GATEWAY,
            _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.category(), "detail": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

/// Specialized `Result` for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_set_matches_spec() {
        assert!(OrchestratorError::ToolTimeout("x".into()).is_recoverable());
        assert!(OrchestratorError::ToolCrash("x".into()).is_recoverable());
        assert!(OrchestratorError::ToolProtocol("x".into()).is_recoverable());
        assert!(OrchestratorError::ToolError("x".into()).is_recoverable());
        assert!(OrchestratorError::ToolUnknown("x".into()).is_recoverable());
        assert!(OrchestratorError::EmbeddingFailed("x".into()).is_recoverable());
        assert!(OrchestratorError::SummaryFailed("x".into()).is_recoverable());
        assert!(OrchestratorError::CacheUnavailable("x".into()).is_recoverable());

        assert!(!OrchestratorError::ProviderUnavailable("x".into()).is_recoverable());
        assert!(!OrchestratorError::ProviderProtocol("x".into()).is_recoverable());
        assert!(!OrchestratorError::RepositoryFailed("x".into()).is_recoverable());
        assert!(!OrchestratorError::InvalidRequest("x".into()).is_recoverable());
    }

    #[test]
    fn tool_message_format_matches_spec() {
        let err = OrchestratorError::ToolTimeout("30s exceeded".into());
        assert_eq!(
            err.as_tool_message("list_directory"),
            "Error executing list_directory: tool timed out: 30s exceeded"
        );
    }

    #[test]
    fn default_classification_is_general_simple() {
        let c = Classification::default();
        assert_eq!(c.intent, "GENERAL");
        assert_eq!(c.complexity, Complexity::Simple);
    }
}
