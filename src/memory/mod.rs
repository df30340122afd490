//! Per-turn context assembly and background summarization (§4.4).
//!
//! User memory facts and preferences live in the repository
//! (`db::ConversationRepository`); this module is where they get woven
//! together with semantic recall and the running summary into the system
//! prompt the Orchestrator sends to the provider.

pub mod composer;

pub use composer::{ComposedContext, MemoryComposer};

use crate::types::Message;

/// Rough token estimate (~4 chars/token), used to keep the summarization
/// transcript from growing unbounded before being sent to the provider.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Truncates history to fit within a token budget, keeping the most recent
/// messages and preserving chronological order.
pub fn truncate_history_to_tokens(history: &[Message], token_budget: usize) -> Vec<Message> {
    let mut result: Vec<Message> = Vec::new();
    let mut total_tokens = 0;

    for msg in history.iter().rev() {
        let msg_tokens = estimate_tokens(&msg.content);
        if total_tokens + msg_tokens > token_budget {
            break;
        }
        result.push(msg.clone());
        total_tokens += msg_tokens;
    }

    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageRole;
    use chrono::Utc;

    fn msg(content: &str) -> Message {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: "c1".to_string(),
            role: MessageRole::User,
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
            created_at: Utc::now(),
        }
    }

    #[test]
    fn estimate_tokens_is_roughly_four_chars_per_token() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn truncate_history_to_tokens_keeps_most_recent() {
        let history = vec![msg("a".repeat(40).as_str()), msg("b".repeat(40).as_str()), msg("c".repeat(40).as_str())];
        let truncated = truncate_history_to_tokens(&history, 15);
        assert_eq!(truncated.len(), 1);
        assert!(truncated[0].content.starts_with('c'));
    }
}
