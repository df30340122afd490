//! libsql-backed `ConversationRepository` (§6 Ambient): embeddable/local-first,
//! extended from the teacher's original schema with the columns the
//! repository interface requires — `sequence_number`, `tool_calls` JSON,
//! `tool_call_id`, per-message token/latency/model metadata, embeddings, and
//! running conversation summaries.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use libsql::{Builder, Connection, Database};

use crate::db::traits::{ConversationRepository, NewMessage};
use crate::types::{Conversation, MemoryFact, Message, MessageRole, OrchestratorError, Result, ToolCall};

pub struct TursoClient {
    db: Database,
}

impl TursoClient {
    pub async fn new_remote(url: String, auth_token: String) -> Result<Self> {
        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| OrchestratorError::RepositoryFailed(format!("failed to connect to Turso: {e}")))?;
        let client = Self { db };
        client.initialize_schema().await?;
        Ok(client)
    }

    pub async fn new_local(path: &str) -> Result<Self> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| OrchestratorError::RepositoryFailed(format!("failed to open local database: {e}")))?;
        let client = Self { db };
        client.initialize_schema().await?;
        Ok(client)
    }

    pub async fn new_memory() -> Result<Self> {
        Self::new_local(":memory:").await
    }

    fn connection(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| OrchestratorError::RepositoryFailed(format!("failed to get connection: {e}")))
    }

    async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                summary TEXT,
                last_summarized_seq INTEGER NOT NULL DEFAULT 0
            )",
            (),
        )
        .await
        .map_err(|e| OrchestratorError::RepositoryFailed(format!("create conversations table: {e}")))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                tool_calls TEXT,
                tool_call_id TEXT,
                prompt_tokens INTEGER,
                completion_tokens INTEGER,
                model TEXT,
                latency_ms INTEGER,
                finish_reason TEXT,
                embedding BLOB,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id)
            )",
            (),
        )
        .await
        .map_err(|e| OrchestratorError::RepositoryFailed(format!("create messages table: {e}")))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_conv_seq ON messages(conversation_id, sequence_number)",
            (),
        )
        .await
        .map_err(|e| OrchestratorError::RepositoryFailed(format!("create messages index: {e}")))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS memory_facts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                category TEXT NOT NULL,
                fact_key TEXT NOT NULL,
                fact_value TEXT NOT NULL,
                confidence REAL NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_accessed INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| OrchestratorError::RepositoryFailed(format!("create memory_facts table: {e}")))?;

        Ok(())
    }
}

fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
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

fn role_to_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

fn role_from_str(s: &str) -> MessageRole {
    match s {
        "system" => MessageRole::System,
        "assistant" => MessageRole::Assistant,
        "tool" => MessageRole::Tool,
        _ => MessageRole::User,
    }
}

fn timestamp(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

#[async_trait]
impl ConversationRepository for TursoClient {
    async fn create_conversation(&self, user_id: &str, title: Option<&str>) -> Result<Conversation> {
        let conn = self.connection()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();

        conn.execute(
            "INSERT INTO conversations (id, user_id, title, created_at, updated_at, last_summarized_seq)
             VALUES (?, ?, ?, ?, ?, 0)",
            (id.as_str(), user_id, title, now, now),
        )
        .await
        .map_err(|e| OrchestratorError::RepositoryFailed(format!("create conversation: {e}")))?;

        Ok(Conversation {
            id,
            user_id: user_id.to_string(),
            title: title.map(|t| t.to_string()),
            created_at: timestamp(now),
            updated_at: timestamp(now),
            summary: None,
            last_summarized_seq: 0,
        })
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, user_id, title, created_at, updated_at, summary, last_summarized_seq
                 FROM conversations WHERE id = ?",
                [id],
            )
            .await
            .map_err(|e| OrchestratorError::RepositoryFailed(format!("get conversation: {e}")))?;

        match rows.next().await.map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))? {
            Some(row) => Ok(Some(Conversation {
                id: row.get(0).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
                user_id: row.get(1).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
                title: row.get(2).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
                created_at: timestamp(row.get(3).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?),
                updated_at: timestamp(row.get(4).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?),
                summary: row.get(5).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
                last_summarized_seq: row.get(6).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
            })),
            None => Ok(None),
        }
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, user_id, title, created_at, updated_at, summary, last_summarized_seq
                 FROM conversations WHERE user_id = ? ORDER BY updated_at DESC",
                [user_id],
            )
            .await
            .map_err(|e| OrchestratorError::RepositoryFailed(format!("list conversations: {e}")))?;

        let mut conversations = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))? {
            conversations.push(Conversation {
                id: row.get(0).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
                user_id: row.get(1).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
                title: row.get(2).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
                created_at: timestamp(row.get(3).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?),
                updated_at: timestamp(row.get(4).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?),
                summary: row.get(5).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
                last_summarized_seq: row.get(6).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
            });
        }
        Ok(conversations)
    }

    async fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, conversation_id, role, content, sequence_number, tool_calls, tool_call_id,
                        prompt_tokens, completion_tokens, model, latency_ms, finish_reason, embedding, created_at
                 FROM messages WHERE conversation_id = ?
                 ORDER BY sequence_number DESC LIMIT ?",
                (conversation_id, limit as i64),
            )
            .await
            .map_err(|e| OrchestratorError::RepositoryFailed(format!("recent messages: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))? {
            messages.push(row_to_message(&row)?);
        }
        messages.reverse();
        Ok(messages)
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        sequence_number: i64,
        extra: NewMessage,
    ) -> Result<Message> {
        let conn = self.connection()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let tool_calls_json = extra
            .tool_calls
            .as_ref()
            .map(|calls| serde_json::to_string(calls).unwrap_or_default());

        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content, sequence_number, tool_calls,
                tool_call_id, prompt_tokens, completion_tokens, model, latency_ms, finish_reason, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.as_str(),
                conversation_id,
                role_to_str(role),
                content,
                sequence_number,
                tool_calls_json.as_deref(),
                extra.tool_call_id.as_deref(),
                extra.prompt_tokens,
                extra.completion_tokens,
                extra.model.as_deref(),
                extra.latency_ms,
                extra.finish_reason.as_deref(),
                now,
            ),
        )
        .await
        .map_err(|e| OrchestratorError::RepositoryFailed(format!("add message: {e}")))?;

        conn.execute(
            "UPDATE conversations SET updated_at = ? WHERE id = ?",
            (now, conversation_id),
        )
        .await
        .map_err(|e| OrchestratorError::RepositoryFailed(format!("touch conversation: {e}")))?;

        Ok(Message {
            id,
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
            created_at: timestamp(now),
        })
    }

    async fn update_message_embedding(&self, message_id: &str, vector: &[f32]) -> Result<()> {
        let conn = self.connection()?;
        let bytes = encode_embedding(vector);
        conn.execute(
            "UPDATE messages SET embedding = ? WHERE id = ?",
            (bytes, message_id),
        )
        .await
        .map_err(|e| OrchestratorError::RepositoryFailed(format!("update embedding: {e}")))?;
        Ok(())
    }

    async fn search_similar(&self, user_id: &str, vector: &[f32], limit: usize, min_sim: f32) -> Result<Vec<Message>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT m.id, m.conversation_id, m.role, m.content, m.sequence_number, m.tool_calls, m.tool_call_id,
                        m.prompt_tokens, m.completion_tokens, m.model, m.latency_ms, m.finish_reason, m.embedding, m.created_at
                 FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE c.user_id = ? AND m.embedding IS NOT NULL",
                [user_id],
            )
            .await
            .map_err(|e| OrchestratorError::RepositoryFailed(format!("search similar: {e}")))?;

        let mut scored: Vec<(f32, Message)> = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))? {
            let message = row_to_message(&row)?;
            if let Some(embedding) = &message.embedding {
                let sim = cosine_similarity(vector, embedding);
                if sim >= min_sim {
                    scored.push((sim, message));
                }
            }
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, m)| m).collect())
    }

    async fn update_summary(&self, conversation_id: &str, summary_text: &str, last_summarized_seq: i64) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE conversations SET summary = ?, last_summarized_seq = ? WHERE id = ?",
            (summary_text, last_summarized_seq, conversation_id),
        )
        .await
        .map_err(|e| OrchestratorError::RepositoryFailed(format!("update summary: {e}")))?;
        Ok(())
    }

    async fn get_summary(&self, conversation_id: &str) -> Result<Option<(String, i64)>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT summary, last_summarized_seq FROM conversations WHERE id = ?",
                [conversation_id],
            )
            .await
            .map_err(|e| OrchestratorError::RepositoryFailed(format!("get summary: {e}")))?;

        match rows.next().await.map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))? {
            Some(row) => {
                let summary: Option<String> = row.get(0).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?;
                let seq: i64 = row.get(1).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?;
                Ok(summary.map(|s| (s, seq)))
            }
            None => Ok(None),
        }
    }

    async fn get_user_memories(&self, user_id: &str) -> Result<Vec<MemoryFact>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, user_id, category, fact_key, fact_value, confidence, created_at, updated_at, last_accessed
                 FROM memory_facts WHERE user_id = ?",
                [user_id],
            )
            .await
            .map_err(|e| OrchestratorError::RepositoryFailed(format!("get user memories: {e}")))?;

        let mut facts = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))? {
            facts.push(MemoryFact {
                id: row.get(0).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
                user_id: row.get(1).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
                category: row.get(2).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
                fact_key: row.get(3).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
                fact_value: row.get(4).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
                confidence: row.get::<f64>(5).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))? as f32,
                created_at: timestamp(row.get(6).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?),
                updated_at: timestamp(row.get(7).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?),
                last_accessed: timestamp(row.get(8).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?),
            });
        }
        Ok(facts)
    }

    async fn latest_sequence_number(&self, conversation_id: &str) -> Result<i64> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT COALESCE(MAX(sequence_number), 0) FROM messages WHERE conversation_id = ?",
                [conversation_id],
            )
            .await
            .map_err(|e| OrchestratorError::RepositoryFailed(format!("latest sequence number: {e}")))?;

        match rows.next().await.map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))? {
            Some(row) => row.get(0).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string())),
            None => Ok(0),
        }
    }
}

fn row_to_message(row: &libsql::Row) -> Result<Message> {
    let tool_calls_json: Option<String> = row.get(5).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?;
    let tool_calls: Option<Vec<ToolCall>> = tool_calls_json.and_then(|s| serde_json::from_str(&s).ok());
    let embedding_bytes: Option<Vec<u8>> = row.get(12).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?;

    Ok(Message {
        id: row.get(0).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
        conversation_id: row.get(1).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
        role: role_from_str(&row.get::<String>(2).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?),
        content: row.get(3).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
        sequence_number: row.get(4).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
        tool_calls,
        tool_call_id: row.get(6).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
        prompt_tokens: row.get(7).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
        completion_tokens: row.get(8).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
        model: row.get(9).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
        latency_ms: row.get(10).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
        finish_reason: row.get(11).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?,
        embedding: embedding_bytes.map(|b| decode_embedding(&b)),
        created_at: timestamp(row.get(13).map_err(|e| OrchestratorError::RepositoryFailed(e.to_string()))?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_conversation() {
        let client = TursoClient::new_memory().await.unwrap();
        let conv = client.create_conversation("user-1", Some("title")).await.unwrap();
        let fetched = client.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(fetched.user_id, "user-1");
        assert_eq!(fetched.title.as_deref(), Some("title"));
    }

    #[tokio::test]
    async fn add_and_recall_messages_in_order() {
        let client = TursoClient::new_memory().await.unwrap();
        let conv = client.create_conversation("user-1", None).await.unwrap();
        client
            .add_message(&conv.id, MessageRole::User, "hello", 1, NewMessage::default())
            .await
            .unwrap();
        client
            .add_message(&conv.id, MessageRole::Assistant, "hi there", 2, NewMessage::default())
            .await
            .unwrap();

        let messages = client.recent_messages(&conv.id, 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].content, "hi there");
    }

    #[tokio::test]
    async fn embedding_roundtrip_and_similarity_search() {
        let client = TursoClient::new_memory().await.unwrap();
        let conv = client.create_conversation("user-1", None).await.unwrap();
        let message = client
            .add_message(&conv.id, MessageRole::User, "I like cats", 1, NewMessage::default())
            .await
            .unwrap();

        let vector = vec![1.0, 0.0, 0.0];
        client.update_message_embedding(&message.id, &vector).await.unwrap();

        let hits = client.search_similar("user-1", &vector, 5, 0.9).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, message.id);
    }

    #[tokio::test]
    async fn summary_roundtrip() {
        let client = TursoClient::new_memory().await.unwrap();
        let conv = client.create_conversation("user-1", None).await.unwrap();
        client.update_summary(&conv.id, "a short summary", 20).await.unwrap();
        let (summary, seq) = client.get_summary(&conv.id).await.unwrap().unwrap();
        assert_eq!(summary, "a short summary");
        assert_eq!(seq, 20);
    }

    #[tokio::test]
    async fn latest_sequence_number_defaults_to_zero() {
        let client = TursoClient::new_memory().await.unwrap();
        let conv = client.create_conversation("user-1", None).await.unwrap();
        assert_eq!(client.latest_sequence_number(&conv.id).await.unwrap(), 0);
    }
}
