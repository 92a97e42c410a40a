//! Shared state for the observer server.

use std::sync::Arc;

use emosim_engine::RunManager;

/// Keep-alive interval for WebSocket connections, in seconds.
pub const KEEPALIVE_SECS: u64 = 30;

/// State injected into the observer routes.
#[derive(Clone)]
pub struct ObserverState {
    /// The run manager serving subscriptions and status queries.
    pub manager: Arc<RunManager>,
}

impl ObserverState {
    /// Create observer state over a run manager.
    pub fn new(manager: Arc<RunManager>) -> Self {
        Self { manager }
    }
}
