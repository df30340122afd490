//! Memory Composer (§4.4): assembles the per-turn system prompt and sliding
//! message window, and owns background conversation summarization.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::db::ConversationRepository;
use crate::embeddings::EmbeddingService;
use crate::llm::{ChatMessage, LlmProvider, ModelParams};
use crate::types::{Message, MessageRole, Result};

const SLIDING_WINDOW_SIZE: usize = 50;
const SEMANTIC_RECALL_LIMIT: usize = 3;
const SEMANTIC_RECALL_MIN_SIMILARITY: f32 = 0.7;
const CONTEXT_CACHE_TTL_SECS: u64 = 60 * 60;
const SUMMARIZATION_GAP_THRESHOLD: i64 = 20;
const SUMMARIZATION_FETCH_CAP: usize = 100;

/// The three cacheable text fragments composed into the system prompt,
/// excluding the message window (always refetched fresh).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ContextFragments {
    user_facts: String,
    semantic_recall: String,
    summary: String,
}

/// Output of a composition: the system prompt prefix and the message
/// window ready to send to the provider.
#[derive(Debug, Clone)]
pub struct ComposedContext {
    pub system_prompt: String,
    pub messages: Vec<Message>,
}

/// Chooses a task prompt by (intent, tools-available). A small fixed set:
/// one general prompt, one for when tools are in scope, keyed loosely since
/// the set of intents is open-ended (driven by the Tool Registry's
/// categories).
fn task_prompt(intent: &str, tools_available: bool) -> String {
    if tools_available {
        format!(
            "You are a helpful assistant currently focused on {intent} tasks. \
             You have tools available — use them when they would produce a more \
             accurate or current answer than your own knowledge."
        )
    } else {
        format!("You are a helpful assistant currently focused on {intent} tasks.")
    }
}

fn format_user_facts(facts: &[crate::types::MemoryFact]) -> String {
    if facts.is_empty() {
        return String::new();
    }
    let bullets: Vec<String> = facts
        .iter()
        .map(|f| format!("- {}/{}: {}", f.category, f.fact_key, f.fact_value))
        .collect();
    format!("Known facts about the user:\n{}", bullets.join("\n"))
}

fn format_semantic_recall(messages: &[Message]) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let bullets: Vec<String> = messages.iter().map(|m| format!("- {}", m.content)).collect();
    format!("Relevant earlier context:\n{}", bullets.join("\n"))
}

pub struct MemoryComposer {
    repo: Arc<dyn ConversationRepository>,
    cache: Arc<dyn Cache>,
    embeddings: Arc<EmbeddingService>,
    provider: Arc<dyn LlmProvider>,
    summarization_model: String,
}

impl MemoryComposer {
    pub fn new(
        repo: Arc<dyn ConversationRepository>,
        cache: Arc<dyn Cache>,
        embeddings: Arc<EmbeddingService>,
        provider: Arc<dyn LlmProvider>,
        summarization_model: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            cache,
            embeddings,
            provider,
            summarization_model: summarization_model.into(),
        }
    }

    /// Assembles the composed system prompt and the sliding message window
    /// for one turn.
    pub async fn compose(&self, conversation_id: &str, user_id: &str, latest_user_text: &str, intent: &str, tools_available: bool) -> Result<ComposedContext> {
        let fragments = self.context_fragments(conversation_id, user_id, latest_user_text).await;

        let mut parts = vec![task_prompt(intent, tools_available)];
        if !fragments.user_facts.is_empty() {
            parts.push(fragments.user_facts.clone());
        }
        if !fragments.semantic_recall.is_empty() {
            parts.push(fragments.semantic_recall.clone());
        }
        if !fragments.summary.is_empty() {
            parts.push(format!("Conversation summary so far:\n{}", fragments.summary));
        }
        let system_prompt = parts.join("\n\n");

        let mut messages = self.repo.recent_messages(conversation_id, SLIDING_WINDOW_SIZE).await?;
        match messages.first() {
            Some(first) if first.role == MessageRole::System => {
                messages[0] = system_message(conversation_id, &system_prompt);
            }
            _ => messages.insert(0, system_message(conversation_id, &system_prompt)),
        }

        Ok(ComposedContext { system_prompt, messages })
    }

    async fn context_fragments(&self, conversation_id: &str, user_id: &str, latest_user_text: &str) -> ContextFragments {
        let cache_key = format!("conversation:{conversation_id}:context");
        if let Ok(Some(cached)) = self.cache.get::<ContextFragments>(&cache_key) {
            return cached;
        }

        let user_facts = match self.repo.get_user_memories(user_id).await {
            Ok(facts) => format_user_facts(&facts),
            Err(_) => String::new(),
        };

        let semantic_recall = match self.embeddings.embed_text(latest_user_text).await {
            Ok(vector) => match self
                .repo
                .search_similar(user_id, &vector, SEMANTIC_RECALL_LIMIT, SEMANTIC_RECALL_MIN_SIMILARITY)
                .await
            {
                Ok(messages) => format_semantic_recall(&messages),
                Err(_) => String::new(),
            },
            // Embedding generation failed — recall is omitted silently.
            Err(_) => String::new(),
        };

        let summary = match self.repo.get_summary(conversation_id).await {
            Ok(Some((text, _))) => text,
            _ => String::new(),
        };

        let fragments = ContextFragments { user_facts, semantic_recall, summary };
        let _ = self.cache.set(&cache_key, &fragments, CONTEXT_CACHE_TTL_SECS);
        fragments
    }

    /// Runs summarization inline if the unsummarized gap has crossed the
    /// threshold. Errors are logged but never surfaced; the turn is never
    /// blocked on this.
    pub async fn maybe_summarize(&self, conversation_id: &str) {
        if let Err(e) = self.try_summarize(conversation_id).await {
            tracing::warn!(error = %e, conversation_id, "summarization failed");
        }
    }

    async fn try_summarize(&self, conversation_id: &str) -> Result<()> {
        let latest_seq = self.repo.latest_sequence_number(conversation_id).await?;
        let (prior_summary, last_summarized_seq) = match self.repo.get_summary(conversation_id).await? {
            Some((text, seq)) => (Some(text), seq),
            None => (None, 0),
        };

        let gap = latest_seq - last_summarized_seq;
        if gap < SUMMARIZATION_GAP_THRESHOLD {
            return Ok(());
        }

        let fetch_count = gap.min(SUMMARIZATION_FETCH_CAP as i64) as usize;
        let messages = self.repo.recent_messages(conversation_id, fetch_count).await?;
        if messages.is_empty() {
            return Ok(());
        }

        let transcript: String = messages
            .iter()
            .map(|m| format!("{:?}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let fresh_summary = self
            .summarize_text(&format!("Summarize this conversation excerpt concisely:\n\n{transcript}"), 200)
            .await?;

        let final_summary = match prior_summary {
            Some(prior) if !prior.is_empty() => {
                self.summarize_text(
                    &format!("Merge these two summaries of the same ongoing conversation into one consolidated summary:\n\nPrevious summary:\n{prior}\n\nNew summary:\n{fresh_summary}"),
                    300,
                )
                .await?
            }
            _ => fresh_summary,
        };

        self.repo.update_summary(conversation_id, &final_summary, latest_seq).await?;
        Ok(())
    }

    async fn summarize_text(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let messages = vec![ChatMessage::user(prompt)];
        let params = ModelParams {
            temperature: Some(0.2),
            max_tokens: Some(max_tokens),
            top_p: None,
        };
        let response = self.provider.complete(&messages, &self.summarization_model, &params, None).await?;
        Ok(response.message.content)
    }
}

fn system_message(conversation_id: &str, content: &str) -> Message {
    Message {
        id: uuid::Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_string(),
        role: MessageRole::System,
        content: content.to_string(),
        tool_calls: None,
        tool_call_id: None,
        sequence_number: 0,
        prompt_tokens: None,
        completion_tokens: None,
        model: None,
        latency_ms: None,
        finish_reason: None,
        embedding: None,
        created_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_prompt_mentions_tools_when_available() {
        let with_tools = task_prompt("GENERAL", true);
        let without_tools = task_prompt("GENERAL", false);
        assert!(with_tools.contains("tools"));
        assert!(!without_tools.contains("tools available"));
    }

    #[test]
    fn format_user_facts_empty_is_empty_string() {
        assert_eq!(format_user_facts(&[]), "");
    }

    #[test]
    fn format_semantic_recall_empty_is_empty_string() {
        assert_eq!(format_semantic_recall(&[]), "");
    }
}
