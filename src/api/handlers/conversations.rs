//! Conversation listing — the crate's other route, a thin read-through to
//! the persistence repository (§6).

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::types::{ConversationSummaryDto, Result};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    pub user_id: String,
}

/// List a user's conversations, most-recently-updated first.
#[utoipa::path(
    get,
    path = "/api/conversations",
    params(("user_id" = String, Query, description = "Owning user id")),
    responses(
        (status = 200, description = "List of conversations", body = Vec<ConversationSummaryDto>),
    ),
    tag = "conversations"
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ListConversationsQuery>,
) -> Result<Json<Vec<ConversationSummaryDto>>> {
    let conversations = state.repo.list_conversations(&query.user_id).await?;
    let summaries: Vec<ConversationSummaryDto> = conversations.iter().map(ConversationSummaryDto::from).collect();
    Ok(Json(summaries))
}
