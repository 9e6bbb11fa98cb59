use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::parse_id;
use crate::state::AppState;
use crate::ws::actor;

/// GET /ws/{forum_id}
/// Realtime channel for one forum. The id is validated before the upgrade;
/// a malformed id gets a plain 400 and no connection is created.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Path(forum_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let forum_id = match parse_id(&forum_id, "forum") {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(raw = %forum_id, "Rejected realtime connection with invalid forum id");
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| actor::run_connection(socket, state, forum_id))
}
