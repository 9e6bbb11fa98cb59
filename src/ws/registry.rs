//! Forum-scoped subscriber registry.
//!
//! `DashMap` shards give the reader-writer discipline: snapshots taken for a
//! broadcast share a shard read lock, while register/unregister take the
//! write lock. No lock is held while frames are being delivered; callers get
//! a cloned snapshot.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use super::{ConnectionHandle, ConnectionId};

/// Tracks which live connections are interested in which forum.
/// Constructed once at startup and shared by the gateway and dispatcher.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    forums: Arc<DashMap<i64, HashMap<ConnectionId, ConnectionHandle>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a forum's set. Registering the same connection
    /// twice leaves a single entry.
    pub fn register(&self, forum_id: i64, handle: ConnectionHandle) {
        let connection_id = handle.id();
        let subscribers = {
            let mut members = self.forums.entry(forum_id).or_default();
            members.insert(connection_id, handle);
            members.len()
        };

        tracing::debug!(
            forum_id,
            connection_id = %connection_id,
            subscribers,
            "Connection registered"
        );
    }

    /// Remove a connection from a forum's set. Returns whether anything was
    /// removed; absent members and unknown forums are a no-op.
    pub fn unregister(&self, forum_id: i64, connection_id: &ConnectionId) -> bool {
        let removed = match self.forums.get_mut(&forum_id) {
            Some(mut members) => members.remove(connection_id).is_some(),
            None => false,
        };

        if removed {
            // Drop the forum entry once its last member leaves
            self.forums
                .remove_if(&forum_id, |_, members| members.is_empty());
            tracing::debug!(
                forum_id,
                connection_id = %connection_id,
                "Connection unregistered"
            );
        }

        removed
    }

    /// Snapshot of a forum's current members, safe to iterate while the
    /// registry keeps changing.
    pub fn connections_for(&self, forum_id: i64) -> Vec<ConnectionHandle> {
        self.forums
            .get(&forum_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_registered(&self, forum_id: i64, connection_id: &ConnectionId) -> bool {
        self.forums
            .get(&forum_id)
            .map(|members| members.contains_key(connection_id))
            .unwrap_or(false)
    }

    /// Number of connections registered under one forum.
    pub fn subscriber_count(&self, forum_id: i64) -> usize {
        self.forums
            .get(&forum_id)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Number of forums with at least one subscriber.
    pub fn forum_count(&self) -> usize {
        self.forums.len()
    }

    /// Close every registered connection and empty the registry.
    pub fn close_all(&self) {
        let forum_ids: Vec<i64> = self.forums.iter().map(|entry| *entry.key()).collect();
        for forum_id in forum_ids {
            if let Some((_, members)) = self.forums.remove(&forum_id) {
                for handle in members.values() {
                    handle.close();
                }
            }
        }
    }
}
