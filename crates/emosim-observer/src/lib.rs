//! Observer layer: WebSocket streaming of run events.
//!
//! External UIs subscribe to a run and receive every event as a JSON
//! envelope. The observer is strictly read-only; all control flows
//! through the run manager's control API.
//!
//! # Modules
//!
//! - [`state`] -- shared route state over the run manager.
//! - [`ws`] -- the `/ws/runs/{run_id}` WebSocket handler.

pub mod state;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use emosim_engine::RunManager;

pub use state::{ObserverState, KEEPALIVE_SECS};

/// Build the observer router.
pub fn router(manager: Arc<RunManager>) -> Router {
    Router::new()
        .route("/ws/runs/{run_id}", get(ws::ws_run))
        .with_state(ObserverState::new(manager))
}

/// Serve the observer on the given address until the process exits.
///
/// # Errors
///
/// Returns an I/O error if the listener cannot bind or the server fails.
pub async fn serve(manager: Arc<RunManager>, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "observer listening");
    axum::serve(listener, router(manager)).await
}
