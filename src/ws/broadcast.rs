//! Best-effort fan-out of forum events to registered connections.
//!
//! Producers call [`Dispatcher::submit`], which only enqueues onto a bounded
//! work queue and returns. A single worker task drains the queue and runs
//! [`broadcast_to_forum`]. Submitters never learn whether delivery worked.

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use super::events::ForumEvent;
use super::registry::SubscriberRegistry;

/// One queued fan-out.
#[derive(Debug)]
struct DispatchJob {
    forum_id: i64,
    event: ForumEvent,
}

/// Cloneable front of the broadcast work queue. Store in AppState.
#[derive(Clone)]
pub struct Dispatcher {
    registry: SubscriberRegistry,
    queue: mpsc::Sender<DispatchJob>,
}

impl Dispatcher {
    /// Create the queue and spawn its worker. The worker stops once
    /// `shutdown` is cancelled or every `Dispatcher` clone is dropped.
    pub fn spawn(registry: SubscriberRegistry, capacity: usize, shutdown: CancellationToken) -> Self {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(registry.clone(), rx, shutdown));
        Self { registry, queue }
    }

    /// Enqueue an event for asynchronous delivery to `forum_id`'s subscribers.
    /// Never blocks; if the queue is full the event is dropped and logged.
    pub fn submit(&self, forum_id: i64, event: ForumEvent) {
        let kind = event.kind();
        match self.queue.try_send(DispatchJob { forum_id, event }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(forum_id, event = kind, "Dispatch queue full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(forum_id, event = kind, "Dispatcher stopped, dropping event");
            }
        }
    }

    /// Deliver immediately on the caller's task. Returns how many
    /// connections accepted the frame.
    pub fn broadcast(&self, forum_id: i64, event: &ForumEvent) -> usize {
        broadcast_to_forum(&self.registry, forum_id, event)
    }
}

async fn run_worker(
    registry: SubscriberRegistry,
    mut rx: mpsc::Receiver<DispatchJob>,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        broadcast_to_forum(&registry, job.forum_id, &job.event);
    }
    tracing::debug!("Dispatch worker stopped");
}

/// Push one event to every connection registered under `forum_id`.
///
/// Works on a snapshot, so the registry lock is not held during delivery.
/// A connection whose frame cannot be queued (closed or buffer full) is
/// closed and unregistered; the rest still receive the event.
pub fn broadcast_to_forum(registry: &SubscriberRegistry, forum_id: i64, event: &ForumEvent) -> usize {
    let subscribers = registry.connections_for(forum_id);
    if subscribers.is_empty() {
        return 0;
    }

    let frame = match event.to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(forum_id, event = event.kind(), error = %e, "Failed to encode event");
            return 0;
        }
    };

    let mut delivered = 0;
    let mut pruned = 0;
    for handle in subscribers {
        match handle.try_send(frame.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::info!(
                    forum_id,
                    connection_id = %handle.id(),
                    error = %e,
                    "Dropping subscriber after failed delivery"
                );
                handle.close();
                if registry.unregister(forum_id, &handle.id()) {
                    pruned += 1;
                }
            }
        }
    }

    tracing::debug!(
        forum_id,
        event = event.kind(),
        delivered,
        pruned,
        "Broadcast complete"
    );
    delivered
}
