//! WebSocket handler streaming a run's events.
//!
//! Clients connect to `GET /ws/runs/{run_id}` and receive every event of
//! the run as a JSON-encoded envelope `{event, data, timestamp}`. Clients
//! may send `{"type": "ping"}` (answered with a `pong` envelope) and
//! `{"type": "get_status"}` (answered with a `run_status` envelope). The
//! server additionally sends a `ping` envelope every 30 seconds as a
//! keep-alive.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::debug;
use uuid::Uuid;

use emosim_engine::EventStream;
use emosim_types::{EventEnvelope, EventType, RunId};

use crate::state::{ObserverState, KEEPALIVE_SECS};

/// Upgrade to a WebSocket and stream the run's events.
///
/// # Route
///
/// `GET /ws/runs/{run_id}`
pub async fn ws_run(
    ws: WebSocketUpgrade,
    Path(run_id): Path<Uuid>,
    State(state): State<ObserverState>,
) -> Response {
    let run_id = RunId::from(run_id);
    let stream = match state.manager.subscribe(run_id) {
        Ok(stream) => stream,
        Err(e) => {
            debug!(run_id = %run_id, error = %e, "subscription rejected");
            return (StatusCode::NOT_FOUND, "run not found").into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_ws(socket, state, run_id, stream))
        .into_response()
}

/// A client-initiated control frame.
#[derive(Debug, serde::Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    kind: String,
}

async fn handle_ws(
    mut socket: WebSocket,
    state: ObserverState,
    run_id: RunId,
    mut stream: EventStream,
) {
    debug!(run_id = %run_id, "websocket client connected");
    let mut keepalive = tokio::time::interval(Duration::from_secs(KEEPALIVE_SECS));
    keepalive.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            event = stream.recv() => {
                match event {
                    Some(envelope) => {
                        if send_envelope(&mut socket, &envelope).await.is_err() {
                            debug!(run_id = %run_id, "client disconnected (send failed)");
                            return;
                        }
                    }
                    None => {
                        debug!(run_id = %run_id, "event stream closed, shutting down socket");
                        return;
                    }
                }
            }
            _ = keepalive.tick() => {
                let ping = EventEnvelope::now(EventType::Ping, serde_json::json!({}));
                if send_envelope(&mut socket, &ping).await.is_err() {
                    return;
                }
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_frame(&mut socket, &state, run_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(run_id = %run_id, "websocket client disconnected");
                        return;
                    }
                    Some(Err(e)) => {
                        debug!(run_id = %run_id, "websocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Answer `ping` and `get_status` frames; ignore anything else.
async fn handle_client_frame(
    socket: &mut WebSocket,
    state: &ObserverState,
    run_id: RunId,
    text: &str,
) {
    let Ok(frame) = serde_json::from_str::<ClientFrame>(text) else {
        return;
    };
    match frame.kind.as_str() {
        "ping" => {
            let pong = EventEnvelope::now(EventType::Pong, serde_json::json!({}));
            let _ = send_envelope(socket, &pong).await;
        }
        "get_status" => {
            let data = match state.manager.get_run(run_id).await {
                Ok(run) => serde_json::json!({
                    "run_id": run.id,
                    "status": run.status,
                    "step": run.current_step,
                }),
                Err(e) => serde_json::json!({"error": e.to_string()}),
            };
            let status = EventEnvelope::now(EventType::RunStatus, data);
            let _ = send_envelope(socket, &status).await;
        }
        other => {
            debug!(kind = other, "ignoring unknown client frame");
        }
    }
}

async fn send_envelope(socket: &mut WebSocket, envelope: &EventEnvelope) -> Result<(), ()> {
    let json = serde_json::to_string(envelope).map_err(|_| ())?;
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}
