//! The chat streaming endpoint — the crate's one real entry point, a thin
//! wrapper around `Orchestrator::handle_turn` (§4.7, §6).

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;

use crate::types::{ChatRequest, OrchestratorError};
use crate::AppState;

/// Stream a turn as server-sent events. Each event's `data` is a
/// JSON-encoded [`Chunk`](crate::types::Chunk); the caller stops consuming
/// after the first chunk with `done=true` (§6).
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Server-sent event stream of chunks"),
        (status = 400, description = "Invalid input"),
    ),
    tag = "chat"
)]
pub async fn chat(State(state): State<AppState>, Json(payload): Json<ChatRequest>) -> Response {
    if payload.message.trim().is_empty() {
        return OrchestratorError::InvalidRequest("message must not be empty".into()).into_response();
    }

    let stream = state.orchestrator.clone().handle_turn(payload).map(|chunk| {
        let data = serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_string());
        Ok::<Event, Infallible>(Event::default().data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}
