use axum::{routing, Router};

use crate::forums::{crud as forum_crud, messages as forum_messages};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    let forum_routes = Router::new()
        .route("/api/forums", routing::get(forum_crud::list_forums))
        .route("/api/forums", routing::post(forum_crud::create_forum))
        .route("/api/forums/{id}", routing::get(forum_crud::get_forum))
        .route("/api/forums/{id}", routing::put(forum_crud::update_forum))
        .route("/api/forums/{id}", routing::delete(forum_crud::delete_forum));

    let message_routes = Router::new()
        .route(
            "/api/forums/{id}/messages",
            routing::get(forum_messages::list_messages),
        )
        .route(
            "/api/forums/{id}/messages",
            routing::post(forum_messages::create_message),
        )
        .route(
            "/api/forums/{id}/messages/{message_id}",
            routing::get(forum_messages::get_message),
        )
        .route(
            "/api/forums/{id}/messages/{message_id}",
            routing::put(forum_messages::edit_message),
        )
        .route(
            "/api/forums/{id}/messages/{message_id}",
            routing::delete(forum_messages::delete_message),
        );

    // Realtime channel scoped to one forum
    let ws_routes = Router::new().route("/ws/{forum_id}", routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", routing::get(health_check));

    Router::new()
        .merge(forum_routes)
        .merge(message_routes)
        .merge(ws_routes)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
