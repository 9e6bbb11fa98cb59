pub mod actor;
pub mod broadcast;
pub mod events;
pub mod handler;
pub mod registry;

use axum::extract::ws::Message as WsMessage;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use broadcast::Dispatcher;
pub use events::ForumEvent;
pub use registry::SubscriberRegistry;

/// Identity of one realtime connection, used for set membership in the registry.
pub type ConnectionId = Uuid;

/// Type alias for the bounded sender feeding a connection's writer task.
pub type ConnectionSender = mpsc::Sender<WsMessage>;

/// Why a frame could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,
    #[error("connection send buffer full")]
    Full,
}

/// Non-owning handle to a live connection.
///
/// The gateway actor owns the socket; the registry and dispatcher only hold
/// clones of this handle. `close()` asks the owner to tear the connection
/// down and may be called any number of times from anywhere.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: ConnectionSender,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(tx: ConnectionSender, cancel: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            cancel,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame without waiting. A full buffer counts as a failure.
    pub fn try_send(&self, msg: WsMessage) -> Result<(), DeliveryError> {
        if self.cancel.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Signal the owning actor to close the connection. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}
