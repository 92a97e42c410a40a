//! Event types and the stream envelope.
//!
//! Every observable fact in a run is emitted as an [`EventEnvelope`]:
//! `{event, data, timestamp}`. Within a tick the ordering contract is
//! fixed: `step_started` precedes all step-scoped events, which precede
//! `step_completed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every event type the engine can emit (plus the client-initiated
/// `ping`/`pong` pair used on the stream transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Sent once when a subscriber attaches.
    Connected,
    /// A tick began.
    StepStarted,
    /// A tick finished; carries actions, messages, and metrics.
    StepCompleted,
    /// A message was published on the bus.
    Message,
    /// An agent action was executed (or failed).
    AgentAction,
    /// An agent arrived at a location.
    AgentMoved,
    /// A move failed; at most once per (agent, target) per tick.
    MovementFailed,
    /// An agent changed destination mid-travel.
    AgentRerouted,
    /// Multi-step travel began; carries the full path.
    TravelStarted,
    /// An agent is continuing along a multi-step path.
    AgentTravelling,
    /// A location was created dynamically.
    LocationCreated,
    /// An agent's dynamic state changed (health, stress, inactive).
    StateChange,
    /// One streamed oracle token for an agent.
    StreamToken,
    /// Run status report (also the reply to `get_status`).
    RunStatus,
    /// The run completed; carries the evaluation.
    RunCompleted,
    /// The run was stopped by command.
    RunStopped,
    /// An agent's oracle call failed or timed out.
    AgentError,
    /// A free-form interaction occurred.
    AgentInteracted,
    /// A conversation was created at a location.
    ConversationCreated,
    /// A conversation ended.
    ConversationEnded,
    /// A cooperation task was proposed.
    TaskProposed,
    /// An agent accepted a task.
    TaskAccepted,
    /// A vote was opened for the next tick.
    VoteOpened,
    /// A vote closed; carries the recorded outcome.
    VoteClosed,
    /// Human agents voted to end the run.
    ConsensusReached,
    /// A fatal run error.
    Error,
    /// Keep-alive probe.
    Ping,
    /// Keep-alive reply.
    Pong,
}

/// The wire envelope delivered to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The event type.
    pub event: EventType,
    /// Event-specific payload.
    pub data: serde_json::Value,
    /// Emission time (ISO-8601 over the wire).
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Build an envelope stamped with the current time.
    pub fn now(event: EventType, data: serde_json::Value) -> Self {
        Self {
            event,
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_snake_case_wire_format() {
        assert_eq!(
            serde_json::to_string(&EventType::StepCompleted).expect("serialize"),
            "\"step_completed\""
        );
        assert_eq!(
            serde_json::to_string(&EventType::StreamToken).expect("serialize"),
            "\"stream_token\""
        );
        let parsed: EventType = serde_json::from_str("\"movement_failed\"").expect("deserialize");
        assert_eq!(parsed, EventType::MovementFailed);
    }

    #[test]
    fn envelope_has_event_data_timestamp_fields() {
        let envelope = EventEnvelope::now(EventType::Ping, serde_json::json!({}));
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert!(value.get("event").is_some());
        assert!(value.get("data").is_some());
        assert!(value.get("timestamp").is_some());
    }
}
