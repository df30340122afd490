//! In-memory `ConversationRepository`, used purely for tests (§6 Ambient),
//! grounded in the teacher's in-memory test fixtures style (state behind a
//! `parking_lot::RwLock`, no I/O).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::db::traits::{ConversationRepository, NewMessage};
use crate::types::{Conversation, MemoryFact, Message, MessageRole, OrchestratorError, Result};

#[derive(Default)]
struct State {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<Message>>,
    memories: HashMap<String, Vec<MemoryFact>>,
}

#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: seed facts for a user, bypassing the write path the
    /// spec leaves out-of-band.
    pub fn seed_memory_facts(&self, user_id: &str, facts: Vec<MemoryFact>) {
        self.state.write().memories.insert(user_id.to_string(), facts);
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl ConversationRepository for InMemoryRepository {
    async fn create_conversation(&self, user_id: &str, title: Option<&str>) -> Result<Conversation> {
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.map(|t| t.to_string()),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            summary: None,
            last_summarized_seq: 0,
        };
        let mut state = self.state.write();
        state.conversations.insert(conversation.id.clone(), conversation.clone());
        state.messages.insert(conversation.id.clone(), Vec::new());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.state.read().conversations.get(id).cloned())
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> = self
            .state
            .read()
            .conversations
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        let state = self.state.read();
        let messages = state.messages.get(conversation_id).cloned().unwrap_or_default();
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        sequence_number: i64,
        extra: NewMessage,
    ) -> Result<Message> {
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            tool_calls: extra.tool_calls,
            tool_call_id: extra.tool_call_id,
            sequence_number,
            prompt_tokens: extra.prompt_tokens,
            completion_tokens: extra.completion_tokens,
            model: extra.model,
            latency_ms: extra.latency_ms,
            finish_reason: extra.finish_reason,
            embedding: None,
            created_at: chrono::Utc::now(),
        };

        let mut state = self.state.write();
        state
            .messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(message.clone());
        if let Some(conversation) = state.conversations.get_mut(conversation_id) {
            conversation.updated_at = chrono::Utc::now();
        }
        Ok(message)
    }

    async fn update_message_embedding(&self, message_id: &str, vector: &[f32]) -> Result<()> {
        let mut state = self.state.write();
        for messages in state.messages.values_mut() {
            if let Some(message) = messages.iter_mut().find(|m| m.id == message_id) {
                message.embedding = Some(vector.to_vec());
                return Ok(());
            }
        }
        Err(OrchestratorError::RepositoryFailed(format!("message '{message_id}' not found")))
    }

    async fn search_similar(&self, user_id: &str, vector: &[f32], limit: usize, min_sim: f32) -> Result<Vec<Message>> {
        let state = self.state.read();
        let mut scored: Vec<(f32, Message)> = Vec::new();
        for conversation in state.conversations.values().filter(|c| c.user_id == user_id) {
            if let Some(messages) = state.messages.get(&conversation.id) {
                for message in messages {
                    if let Some(embedding) = &message.embedding {
                        let sim = cosine_similarity(vector, embedding);
                        if sim >= min_sim {
                            scored.push((sim, message.clone()));
                        }
                    }
                }
            }
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, m)| m).collect())
    }

    async fn update_summary(&self, conversation_id: &str, summary_text: &str, last_summarized_seq: i64) -> Result<()> {
        let mut state = self.state.write();
        let conversation = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| OrchestratorError::RepositoryFailed(format!("conversation '{conversation_id}' not found")))?;
        conversation.summary = Some(summary_text.to_string());
        conversation.last_summarized_seq = last_summarized_seq;
        Ok(())
    }

    async fn get_summary(&self, conversation_id: &str) -> Result<Option<(String, i64)>> {
        let state = self.state.read();
        Ok(state
            .conversations
            .get(conversation_id)
            .and_then(|c| c.summary.clone().map(|s| (s, c.last_summarized_seq))))
    }

    async fn get_user_memories(&self, user_id: &str) -> Result<Vec<MemoryFact>> {
        Ok(self.state.read().memories.get(user_id).cloned().unwrap_or_default())
    }

    async fn latest_sequence_number(&self, conversation_id: &str) -> Result<i64> {
        let state = self.state.read();
        Ok(state
            .messages
            .get(conversation_id)
            .and_then(|messages| messages.last())
            .map(|m| m.sequence_number)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_add_messages() {
        let repo = InMemoryRepository::new();
        let conv = repo.create_conversation("u1", Some("t")).await.unwrap();
        repo.add_message(&conv.id, MessageRole::User, "hi", 1, NewMessage::default())
            .await
            .unwrap();
        let messages = repo.recent_messages(&conv.id, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(repo.latest_sequence_number(&conv.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_similar_respects_threshold() {
        let repo = InMemoryRepository::new();
        let conv = repo.create_conversation("u1", None).await.unwrap();
        let message = repo
            .add_message(&conv.id, MessageRole::User, "hi", 1, NewMessage::default())
            .await
            .unwrap();
        repo.update_message_embedding(&message.id, &[1.0, 0.0]).await.unwrap();

        let close = repo.search_similar("u1", &[1.0, 0.0], 5, 0.9).await.unwrap();
        assert_eq!(close.len(), 1);

        let far = repo.search_similar("u1", &[0.0, 1.0], 5, 0.9).await.unwrap();
        assert!(far.is_empty());
    }

    #[tokio::test]
    async fn seeded_memory_facts_are_returned() {
        let repo = InMemoryRepository::new();
        repo.seed_memory_facts(
            "u1",
            vec![MemoryFact {
                id: "f1".into(),
                user_id: "u1".into(),
                category: "work".into(),
                fact_key: "role".into(),
                fact_value: "engineer".into(),
                confidence: 0.9,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
                last_accessed: chrono::Utc::now(),
            }],
        );
        let facts = repo.get_user_memories("u1").await.unwrap();
        assert_eq!(facts.len(), 1);
    }
}
