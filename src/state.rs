use tokio_util::sync::CancellationToken;

use crate::config::RealtimeConfig;
use crate::db::{DbPool, ForumStore};
use crate::ws::{Dispatcher, SubscriberRegistry};

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Forum and message persistence
    pub store: ForumStore,
    /// Live realtime subscribers per forum
    pub registry: SubscriberRegistry,
    /// Fire-and-forget broadcast queue over `registry`
    pub dispatcher: Dispatcher,
    /// Heartbeat and buffer limits for realtime connections
    pub realtime: RealtimeConfig,
    /// Cancelled on process shutdown; every connection holds a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build the state and start the dispatch worker. Must be called inside
    /// a tokio runtime.
    pub fn new(db: DbPool, realtime: RealtimeConfig, shutdown: CancellationToken) -> Self {
        let registry = SubscriberRegistry::new();
        let dispatcher = Dispatcher::spawn(
            registry.clone(),
            realtime.dispatch_queue,
            shutdown.clone(),
        );

        Self {
            store: ForumStore::new(db),
            registry,
            dispatcher,
            realtime,
            shutdown,
        }
    }

    /// Stop the dispatcher, interrupt every connection and release the registry.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.registry.close_all();
    }
}
