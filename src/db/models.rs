/// Row types for the forum schema defined in migrations.rs.
/// They double as the JSON bodies of the REST API and the payloads of
/// realtime events.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discussion topic. `id` is assigned by the store and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forum {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A post scoped to exactly one forum for its whole life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub forum_id: i64,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when creating or updating a forum.
#[derive(Debug, Clone)]
pub struct ForumDraft {
    pub title: String,
    pub description: String,
}

/// Fields accepted when creating a message.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub forum_id: i64,
    pub author: String,
    pub content: String,
}
