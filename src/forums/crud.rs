use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::db::models::{Forum, ForumDraft};
use crate::error::{parse_id, ApiError};
use crate::state::AppState;
use crate::ws::ForumEvent;

// --- Request types ---

#[derive(Debug, Deserialize)]
pub struct ForumRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl ForumRequest {
    fn into_draft(self) -> Result<ForumDraft, ApiError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ApiError::BadRequest("Forum title cannot be empty".to_string()));
        }
        Ok(ForumDraft {
            title,
            description: self.description.trim().to_string(),
        })
    }
}

// --- Handlers ---

/// GET /api/forums: All forums ordered by id.
pub async fn list_forums(State(state): State<AppState>) -> Result<Json<Vec<Forum>>, ApiError> {
    let forums = state
        .store
        .list_forums()
        .await
        .map_err(|e| ApiError::from_store(e, "Forum not found"))?;
    Ok(Json(forums))
}

/// POST /api/forums: Create a forum and announce it to subscribers of its id.
pub async fn create_forum(
    State(state): State<AppState>,
    payload: Result<Json<ForumRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Forum>), ApiError> {
    let Json(body) = payload?;
    let draft = body.into_draft()?;

    let forum = state
        .store
        .create_forum(draft)
        .await
        .map_err(|e| ApiError::from_store(e, "Forum not found"))?;

    tracing::info!(forum_id = forum.id, title = %forum.title, "Forum created");

    state
        .dispatcher
        .submit(forum.id, ForumEvent::ForumCreated(forum.clone()));

    Ok((StatusCode::CREATED, Json(forum)))
}

/// GET /api/forums/{id}
pub async fn get_forum(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Forum>, ApiError> {
    let id = parse_id(&id, "forum")?;
    let forum = state
        .store
        .get_forum(id)
        .await
        .map_err(|e| ApiError::from_store(e, "Forum not found"))?;
    Ok(Json(forum))
}

/// PUT /api/forums/{id}: Replace title and description.
pub async fn update_forum(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ForumRequest>, JsonRejection>,
) -> Result<Json<Forum>, ApiError> {
    let id = parse_id(&id, "forum")?;
    let Json(body) = payload?;
    let draft = body.into_draft()?;

    let forum = state
        .store
        .update_forum(id, draft)
        .await
        .map_err(|e| ApiError::from_store(e, "Forum not found"))?;

    tracing::info!(forum_id = id, "Forum updated");
    Ok(Json(forum))
}

/// DELETE /api/forums/{id}: Removes the forum and all of its messages.
pub async fn delete_forum(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "forum")?;
    state
        .store
        .delete_forum(id)
        .await
        .map_err(|e| ApiError::from_store(e, "Forum not found"))?;

    tracing::info!(forum_id = id, "Forum deleted");
    Ok(StatusCode::NO_CONTENT)
}
