//! Forum and message persistence.
//!
//! Every operation takes the connection lock inside `spawn_blocking`, so a
//! single call is atomic with respect to other calls. Forum existence for a
//! new message is enforced by the `forum_id` foreign key rather than a
//! separate lookup, which keeps a concurrent forum delete from leaving an
//! orphaned message behind.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{Forum, ForumDraft, Message, MessageDraft};
use super::{DbPool, StoreError};

const FORUM_COLUMNS: &str = "id, title, description, created_at";
const MESSAGE_COLUMNS: &str = "id, forum_id, author, content, created_at";

/// Handle to the relational store. Cheap to clone.
#[derive(Clone)]
pub struct ForumStore {
    db: DbPool,
}

impl ForumStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Run a closure against the locked connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&conn)
        })
        .await?
    }

    // --- Forums ---

    pub async fn create_forum(&self, draft: ForumDraft) -> Result<Forum, StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO forums (title, description, created_at) VALUES (?1, ?2, ?3)",
                params![draft.title, draft.description, Utc::now()],
            )?;
            fetch_forum(conn, conn.last_insert_rowid())
        })
        .await
    }

    pub async fn get_forum(&self, id: i64) -> Result<Forum, StoreError> {
        self.with_conn(move |conn| fetch_forum(conn, id)).await
    }

    pub async fn list_forums(&self) -> Result<Vec<Forum>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {FORUM_COLUMNS} FROM forums ORDER BY id ASC"))?;
            let forums = stmt
                .query_map([], forum_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(forums)
        })
        .await
    }

    pub async fn update_forum(&self, id: i64, draft: ForumDraft) -> Result<Forum, StoreError> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE forums SET title = ?1, description = ?2 WHERE id = ?3",
                params![draft.title, draft.description, id],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound);
            }
            fetch_forum(conn, id)
        })
        .await
    }

    /// Delete a forum. Its messages go with it (ON DELETE CASCADE).
    pub async fn delete_forum(&self, id: i64) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM forums WHERE id = ?1", params![id])?;
            if deleted == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    // --- Messages ---

    /// Persist a message. Fails with `NotFound` when the forum does not exist.
    pub async fn create_message(&self, draft: MessageDraft) -> Result<Message, StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (forum_id, author, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![draft.forum_id, draft.author, draft.content, Utc::now()],
            )
            .map_err(map_foreign_key_violation)?;
            fetch_message(conn, draft.forum_id, conn.last_insert_rowid())
        })
        .await
    }

    pub async fn get_message(&self, forum_id: i64, message_id: i64) -> Result<Message, StoreError> {
        self.with_conn(move |conn| fetch_message(conn, forum_id, message_id))
            .await
    }

    /// All messages of a forum in creation order. `NotFound` if the forum is missing.
    pub async fn list_messages(&self, forum_id: i64) -> Result<Vec<Message>, StoreError> {
        self.with_conn(move |conn| {
            fetch_forum(conn, forum_id)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE forum_id = ?1
                 ORDER BY created_at ASC, id ASC"
            ))?;
            let messages = stmt
                .query_map(params![forum_id], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
    }

    /// Replace a message's content. The owning forum never changes.
    pub async fn update_message(
        &self,
        forum_id: i64,
        message_id: i64,
        content: String,
    ) -> Result<Message, StoreError> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE messages SET content = ?1 WHERE id = ?2 AND forum_id = ?3",
                params![content, message_id, forum_id],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound);
            }
            fetch_message(conn, forum_id, message_id)
        })
        .await
    }

    pub async fn delete_message(&self, forum_id: i64, message_id: i64) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND forum_id = ?2",
                params![message_id, forum_id],
            )?;
            if deleted == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }
}

fn fetch_forum(conn: &Connection, id: i64) -> Result<Forum, StoreError> {
    conn.query_row(
        &format!("SELECT {FORUM_COLUMNS} FROM forums WHERE id = ?1"),
        params![id],
        forum_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound)
}

fn fetch_message(conn: &Connection, forum_id: i64, message_id: i64) -> Result<Message, StoreError> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND forum_id = ?2"),
        params![message_id, forum_id],
        message_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound)
}

fn forum_from_row(row: &Row<'_>) -> rusqlite::Result<Forum> {
    Ok(Forum {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        forum_id: row.get(1)?,
        author: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// A foreign-key failure on insert means the referenced forum is gone.
fn map_foreign_key_violation(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(e, _) = &err {
        if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
            return StoreError::NotFound;
        }
    }
    StoreError::Database(err)
}
