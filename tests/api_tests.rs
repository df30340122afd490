//! HTTP surface tests against the embedding-free routes (§6). `/api/chat`
//! is deliberately not exercised here: `Orchestrator::handle_turn` always
//! routes through `MemoryComposer::compose`, which calls
//! `EmbeddingService::embed_text` and needs a real model download — see
//! `orchestrator_live_tests.rs` for that path.

mod common;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use axum_test::TestServer;
use conductor::db::InMemoryRepository;
use conductor::{
    AppState, Classifier, ConversationRepository, EmbeddingService, LruCache, MemoryComposer, Orchestrator, Planner,
    ToolRegistry,
};

use common::mock_provider::ScriptedProvider;

fn test_app() -> (Router, Arc<dyn ConversationRepository>) {
    let repo: Arc<dyn ConversationRepository> = Arc::new(InMemoryRepository::new());
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let registry = Arc::new(ToolRegistry::with_default_tools());
    let cache = Arc::new(LruCache::with_defaults());
    let embeddings = Arc::new(EmbeddingService::with_defaults());
    let composer = Arc::new(MemoryComposer::new(
        repo.clone(),
        cache,
        embeddings.clone(),
        provider.clone(),
        "test-model".to_string(),
    ));
    let classifier = Arc::new(Classifier::new(provider.clone(), "test-model"));
    let planner = Arc::new(Planner::new(provider.clone(), "test-model"));
    let orchestrator = Arc::new(Orchestrator::new(
        repo.clone(),
        provider,
        registry,
        composer,
        classifier,
        planner,
        embeddings,
        "test-model".to_string(),
        "test-vision-model".to_string(),
    ));

    let state = AppState { orchestrator, repo: repo.clone() };
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", conductor::api::routes::create_router())
        .with_state(state);
    (app, repo)
}

#[tokio::test]
async fn health_check_returns_ok() {
    let (app, _repo) = test_app();
    let server = TestServer::new(app).unwrap();
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("OK");
}

#[tokio::test]
async fn list_conversations_returns_empty_for_unknown_user() {
    let (app, _repo) = test_app();
    let server = TestServer::new(app).unwrap();
    let response = server.get("/api/conversations").add_query_param("user_id", "nobody").await;
    response.assert_status_ok();
    let body: Vec<serde_json::Value> = response.json();
    assert!(body.is_empty());
}

#[tokio::test]
async fn list_conversations_returns_seeded_conversations() {
    let (app, repo) = test_app();
    repo.create_conversation("user-1", Some("first chat")).await.unwrap();

    let server = TestServer::new(app).unwrap();
    let response = server.get("/api/conversations").add_query_param("user_id", "user-1").await;
    response.assert_status_ok();
    let body: Vec<serde_json::Value> = response.json();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0]["title"], "first chat");
}

#[tokio::test]
async fn chat_rejects_an_empty_message_without_touching_the_orchestrator() {
    let (app, _repo) = test_app();
    let server = TestServer::new(app).unwrap();
    let response = server
        .post("/api/chat")
        .json(&serde_json::json!({"user_id": "user-1", "message": ""}))
        .await;
    response.assert_status_bad_request();
}
