//! REST endpoints for forum messages, including the ingestion path that
//! feeds the realtime dispatcher.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::db::models::{Message, MessageDraft};
use crate::error::{parse_id, ApiError};
use crate::state::AppState;
use crate::ws::ForumEvent;

// --- Request types ---

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    #[serde(default)]
    pub content: String,
}

// --- Handlers ---

/// POST /api/forums/{id}/messages
/// Validate, persist, then hand the stored message to the dispatcher.
/// The response does not wait for realtime delivery.
pub async fn create_message(
    State(state): State<AppState>,
    Path(forum_id): Path<String>,
    payload: Result<Json<CreateMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let forum_id = parse_id(&forum_id, "forum")?;
    let Json(body) = payload?;

    let author = body.author.trim().to_string();
    let content = validate_content(&body.content)?;
    if author.is_empty() {
        return Err(ApiError::BadRequest(
            "Author and content are required".to_string(),
        ));
    }

    let message = state
        .store
        .create_message(MessageDraft {
            forum_id,
            author,
            content,
        })
        .await
        .map_err(|e| ApiError::from_store(e, "Forum not found"))?;

    tracing::info!(forum_id, message_id = message.id, "Message created");

    state
        .dispatcher
        .submit(forum_id, ForumEvent::MessageCreated(message.clone()));

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/forums/{id}/messages: Full history in creation order.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(forum_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let forum_id = parse_id(&forum_id, "forum")?;
    let messages = state
        .store
        .list_messages(forum_id)
        .await
        .map_err(|e| ApiError::from_store(e, "Forum not found"))?;
    Ok(Json(messages))
}

/// GET /api/forums/{forum_id}/messages/{message_id}
pub async fn get_message(
    State(state): State<AppState>,
    Path((forum_id, message_id)): Path<(String, String)>,
) -> Result<Json<Message>, ApiError> {
    let forum_id = parse_id(&forum_id, "forum")?;
    let message_id = parse_id(&message_id, "message")?;
    let message = state
        .store
        .get_message(forum_id, message_id)
        .await
        .map_err(|e| ApiError::from_store(e, "Message not found"))?;
    Ok(Json(message))
}

/// PUT /api/forums/{forum_id}/messages/{message_id}: Replace content.
pub async fn edit_message(
    State(state): State<AppState>,
    Path((forum_id, message_id)): Path<(String, String)>,
    payload: Result<Json<EditMessageRequest>, JsonRejection>,
) -> Result<Json<Message>, ApiError> {
    let forum_id = parse_id(&forum_id, "forum")?;
    let message_id = parse_id(&message_id, "message")?;
    let Json(body) = payload?;
    let content = validate_content(&body.content)?;

    let message = state
        .store
        .update_message(forum_id, message_id, content)
        .await
        .map_err(|e| ApiError::from_store(e, "Message not found"))?;

    tracing::info!(forum_id, message_id, "Message edited");
    Ok(Json(message))
}

/// DELETE /api/forums/{forum_id}/messages/{message_id}
pub async fn delete_message(
    State(state): State<AppState>,
    Path((forum_id, message_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let forum_id = parse_id(&forum_id, "forum")?;
    let message_id = parse_id(&message_id, "message")?;

    state
        .store
        .delete_message(forum_id, message_id)
        .await
        .map_err(|e| ApiError::from_store(e, "Message not found"))?;

    tracing::info!(forum_id, message_id, "Message deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Helpers ---

/// Trim message content; blank content is rejected.
fn validate_content(raw: &str) -> Result<String, ApiError> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest(
            "Author and content are required".to_string(),
        ));
    }
    Ok(content.to_string())
}
