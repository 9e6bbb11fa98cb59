//! Wire format of events pushed to realtime subscribers.
//!
//! Every frame is a JSON text message shaped `{"type": ..., "payload": ...}`.

use axum::extract::ws::Message as WsMessage;
use serde::{Deserialize, Serialize};

use crate::db::models::{Forum, Message};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ForumEvent {
    /// A message was persisted in the forum.
    MessageCreated(Message),
    /// A forum was created.
    ForumCreated(Forum),
}

impl ForumEvent {
    /// The `type` tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageCreated(_) => "message_created",
            Self::ForumCreated(_) => "forum_created",
        }
    }

    /// Encode as a WebSocket text frame.
    pub fn to_frame(&self) -> Result<WsMessage, serde_json::Error> {
        let text = serde_json::to_string(self)?;
        Ok(WsMessage::Text(text.into()))
    }
}
