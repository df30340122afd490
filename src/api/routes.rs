use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

/// The full `/api` router: one streaming chat route and one conversation
/// listing route (§6 — no auth/session layer in scope).
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(crate::api::handlers::chat::chat))
        .route("/conversations", get(crate::api::handlers::conversations::list_conversations))
}
