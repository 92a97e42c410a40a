//! Event fan-out to subscribers.
//!
//! The emitter keeps a registry of sinks, each backed by a bounded
//! channel. Emission is synchronous relative to the engine: the engine
//! does not proceed until every live subscriber has accepted the event.
//! Backpressure blocks the engine rather than dropping events; a
//! subscriber whose receiver is gone is removed from the registry and
//! logged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

use emosim_types::{EventEnvelope, EventType};

/// Default per-subscriber buffer size.
pub const DEFAULT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
struct Sink {
    id: u64,
    tx: mpsc::Sender<EventEnvelope>,
}

/// A subscription to a run's event stream.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event; `None` when the run is gone.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// The per-run event emitter.
#[derive(Debug, Default)]
pub struct EventEmitter {
    sinks: Mutex<Vec<Sink>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    /// Create an emitter with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and deliver the `connected` event to it.
    pub fn subscribe(&self, buffer: usize) -> EventStream {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // `connected` goes only to the new subscriber; capacity >= 1
        // guarantees this send succeeds on a fresh channel.
        let _ = tx.try_send(EventEnvelope::now(
            EventType::Connected,
            serde_json::json!({}),
        ));

        self.lock().push(Sink { id, tx });
        EventStream { rx }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver an event to every subscriber, blocking on full buffers.
    pub async fn emit(&self, event: EventType, data: serde_json::Value) {
        let envelope = EventEnvelope::now(event, data);
        let sinks: Vec<Sink> = self.lock().clone();
        let mut dead = Vec::new();

        for sink in &sinks {
            if sink.tx.send(envelope.clone()).await.is_err() {
                dead.push(sink.id);
            }
        }

        if !dead.is_empty() {
            tracing::debug!(dropped = dead.len(), "removing closed event subscribers");
            self.lock().retain(|s| !dead.contains(&s.id));
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sink>> {
        self.sinks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn subscriber_receives_connected_first() {
        let emitter = EventEmitter::new();
        let mut stream = emitter.subscribe(8);
        let event = stream.recv().await.expect("event");
        assert_eq!(event.event, EventType::Connected);
    }

    #[tokio::test]
    async fn events_arrive_in_emission_order() {
        let emitter = EventEmitter::new();
        let mut stream = emitter.subscribe(8);
        emitter.emit(EventType::StepStarted, serde_json::json!({"step": 1})).await;
        emitter.emit(EventType::StepCompleted, serde_json::json!({"step": 1})).await;

        let _ = stream.recv().await; // connected
        assert_eq!(stream.recv().await.expect("event").event, EventType::StepStarted);
        assert_eq!(stream.recv().await.expect("event").event, EventType::StepCompleted);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned() {
        let emitter = EventEmitter::new();
        let stream = emitter.subscribe(8);
        assert_eq!(emitter.subscriber_count(), 1);
        drop(stream);
        emitter.emit(EventType::Ping, serde_json::json!({})).await;
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn full_buffer_blocks_until_drained() {
        let emitter = Arc::new(EventEmitter::new());
        let mut stream = emitter.subscribe(1);
        let _ = stream.recv().await; // connected

        // Fill the buffer.
        emitter.emit(EventType::Ping, serde_json::json!({})).await;

        // The next emit must block until the subscriber drains.
        let blocked = {
            let emitter = Arc::clone(&emitter);
            tokio::spawn(async move {
                emitter.emit(EventType::Pong, serde_json::json!({})).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!blocked.is_finished());

        assert_eq!(stream.recv().await.expect("event").event, EventType::Ping);
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("unblocked")
            .expect("join");
        assert_eq!(stream.recv().await.expect("event").event, EventType::Pong);
    }

    #[tokio::test]
    async fn multiple_subscribers_see_every_event() {
        let emitter = EventEmitter::new();
        let mut a = emitter.subscribe(8);
        let mut b = emitter.subscribe(8);
        emitter.emit(EventType::Ping, serde_json::json!({})).await;

        let _ = a.recv().await;
        let _ = b.recv().await;
        assert_eq!(a.recv().await.expect("event").event, EventType::Ping);
        assert_eq!(b.recv().await.expect("event").event, EventType::Ping);
    }
}
