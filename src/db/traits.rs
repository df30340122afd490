//! Persistence repository interface (§6), consumed by the Orchestrator and
//! Memory Composer and implemented externally — by `TursoClient` for a real
//! runnable process, and by `InMemoryRepository` purely for tests.

use async_trait::async_trait;

use crate::types::{Conversation, MemoryFact, Message, MessageRole, Result};

/// New-message fields accepted by `add_message`, grouped since most are
/// optional and vary by role.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub tool_calls: Option<Vec<crate::types::ToolCall>>,
    pub tool_call_id: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub model: Option<String>,
    pub latency_ms: Option<i64>,
    pub finish_reason: Option<String>,
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create_conversation(&self, user_id: &str, title: Option<&str>) -> Result<Conversation>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>>;

    /// Chronological, last `limit` messages.
    async fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>>;

    async fn add_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        sequence_number: i64,
        extra: NewMessage,
    ) -> Result<Message>;

    async fn update_message_embedding(&self, message_id: &str, vector: &[f32]) -> Result<()>;

    /// Searches across all of the user's conversations by embedding cosine
    /// similarity, ordered closest-first.
    async fn search_similar(&self, user_id: &str, vector: &[f32], limit: usize, min_sim: f32) -> Result<Vec<Message>>;

    async fn update_summary(&self, conversation_id: &str, summary_text: &str, last_summarized_seq: i64) -> Result<()>;

    async fn get_summary(&self, conversation_id: &str) -> Result<Option<(String, i64)>>;

    async fn get_user_memories(&self, user_id: &str) -> Result<Vec<MemoryFact>>;

    /// Highest `sequence_number` currently persisted for this conversation,
    /// or 0 if it has no messages yet.
    async fn latest_sequence_number(&self, conversation_id: &str) -> Result<i64>;
}
