//! Conversation endpoints: start, send, snapshot, list, assistant context.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::assistant::triggers;
use crate::config::AppState;
use crate::handlers::caller;
use crate::models::{
    Conversation, ConversationSnapshot, Message, SendMessageInput, StartConversationInput,
    StartConversationResponse,
};

/// POST /chat
///
/// Idempotent create-or-fetch of the conversation for a participant pair.
pub async fn start_conversation(
    State(state): State<AppState>,
    Json(input): Json<StartConversationInput>,
) -> Result<Json<StartConversationResponse>, StatusCode> {
    info!("POST /chat ({} <-> {})", input.user_a, input.user_b);

    let conversation_key = state
        .service
        .start_or_get_conversation(&input.user_a, &input.user_b)
        .await
        .map_err(|e| {
            error!("Failed to start conversation: {}", e);
            e.status_code()
        })?;

    Ok(Json(StartConversationResponse { conversation_key }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub user: String,
}

/// GET /chat/conversations?user=
///
/// Conversation list with denormalized last-message previews.
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Conversation>>, StatusCode> {
    let conversations = state
        .service
        .list_conversations(&query.user)
        .await
        .map_err(|e| {
            error!("Failed to list conversations: {}", e);
            e.status_code()
        })?;

    Ok(Json(conversations))
}

/// GET /chat/{key}
///
/// Filtered history snapshot for the calling viewer.
pub async fn get_conversation(
    Path(key): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<ConversationSnapshot>, StatusCode> {
    let viewer = caller(&headers);
    info!("GET /chat/{} (viewer {})", key, viewer);

    let messages = state.service.snapshot(&key, &viewer).await.map_err(|e| {
        error!("Failed to snapshot conversation: {}", e);
        e.status_code()
    })?;

    Ok(Json(ConversationSnapshot {
        conversation_key: key,
        messages,
    }))
}

/// PUT /chat/{key}
///
/// Send a message. Rejected with 403 when a block exists in either
/// direction; store failures map to their status so the UI can retry.
pub async fn put_message(
    Path(key): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(input): Json<SendMessageInput>,
) -> Result<Json<Message>, StatusCode> {
    let sender = caller(&headers);
    info!("PUT /chat/{} (sender {})", key, sender);

    let message = state
        .service
        .send(&key, &sender, &input.content, input.category)
        .await
        .map_err(|e| {
            error!("Failed to send message: {}", e);
            e.status_code()
        })?;

    Ok(Json(message))
}

/// DELETE /chat/{key}/context
///
/// Reset assistant memory for a conversation. Durable history is untouched.
pub async fn clear_context(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> StatusCode {
    info!("DELETE /chat/{}/context", key);
    state.service.clear_context(&key);
    StatusCode::OK
}

/// GET /assistant/commands
pub async fn command_suggestions() -> Json<Vec<&'static str>> {
    Json(triggers::command_suggestions())
}
