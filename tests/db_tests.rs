//! Cross-backend `ConversationRepository` parity: the same behavioral
//! contract exercised against both `InMemoryRepository` and `TursoClient`,
//! since the orchestrator must not care which one it's handed (§6).

use conductor::db::{ConversationRepository, InMemoryRepository, NewMessage, TursoClient};
use conductor::types::MessageRole;

async fn list_conversations_scopes_to_user(repo: &dyn ConversationRepository) {
    let mine = repo.create_conversation("user-1", Some("mine")).await.unwrap();
    let _theirs = repo.create_conversation("user-2", Some("theirs")).await.unwrap();

    let listed = repo.list_conversations("user-1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, mine.id);
}

async fn unknown_conversation_is_not_found(repo: &dyn ConversationRepository) {
    assert!(repo.get_conversation("does-not-exist").await.unwrap().is_none());
}

async fn unknown_user_has_no_memories(repo: &dyn ConversationRepository) {
    let memories = repo.get_user_memories("nobody").await.unwrap();
    assert!(memories.is_empty());
}

async fn sequence_numbers_advance_with_each_message(repo: &dyn ConversationRepository) {
    let conv = repo.create_conversation("user-1", None).await.unwrap();
    assert_eq!(repo.latest_sequence_number(&conv.id).await.unwrap(), 0);

    repo.add_message(&conv.id, MessageRole::User, "hi", 1, NewMessage::default()).await.unwrap();
    assert_eq!(repo.latest_sequence_number(&conv.id).await.unwrap(), 1);

    repo.add_message(&conv.id, MessageRole::Assistant, "hello", 2, NewMessage::default()).await.unwrap();
    assert_eq!(repo.latest_sequence_number(&conv.id).await.unwrap(), 2);
}

async fn tool_call_round_trips_through_add_message(repo: &dyn ConversationRepository) {
    let conv = repo.create_conversation("user-1", None).await.unwrap();
    let tool_calls = vec![conductor::types::ToolCall {
        id: "call-1".to_string(),
        name: "search".to_string(),
        arguments: serde_json::json!({"query": "weather"}),
    }];
    let extra = NewMessage { tool_calls: Some(tool_calls.clone()), ..Default::default() };
    let saved = repo.add_message(&conv.id, MessageRole::Assistant, "", 1, extra).await.unwrap();

    let recalled = repo.recent_messages(&conv.id, 10).await.unwrap();
    assert_eq!(recalled.len(), 1);
    let recalled_calls = recalled[0].tool_calls.as_ref().expect("tool_calls should round-trip");
    assert_eq!(recalled_calls[0].name, "search");
    assert_eq!(saved.id, recalled[0].id);
}

#[tokio::test]
async fn in_memory_repository_satisfies_contract() {
    let repo = InMemoryRepository::new();
    list_conversations_scopes_to_user(&repo).await;
    unknown_conversation_is_not_found(&repo).await;
    unknown_user_has_no_memories(&repo).await;
    sequence_numbers_advance_with_each_message(&repo).await;
    tool_call_round_trips_through_add_message(&repo).await;
}

#[tokio::test]
async fn turso_in_memory_db_satisfies_contract() {
    let repo = TursoClient::new_memory().await.unwrap();
    list_conversations_scopes_to_user(&repo).await;
    unknown_conversation_is_not_found(&repo).await;
    unknown_user_has_no_memories(&repo).await;
    sequence_numbers_advance_with_each_message(&repo).await;
    tool_call_round_trips_through_add_message(&repo).await;
}
