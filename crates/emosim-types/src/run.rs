//! Run records and the durable per-tick artifacts.
//!
//! A [`Run`] is one execution instance of a scenario. Every tick produces
//! exactly one [`StepRecord`] plus the [`MessageRecord`]s published during
//! that tick; these are the persistence boundary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{ActionType, MessageType, RunStatus};
use crate::ids::{AgentId, LocationId, MessageId, RunId, ScenarioId};

/// A single execution instance of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier.
    pub id: RunId,
    /// The scenario this run was created from.
    pub scenario_id: ScenarioId,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Last executed tick (0 before the first tick).
    pub current_step: u64,
    /// Maximum ticks; `None` means run until a terminal condition.
    pub max_steps: Option<u64>,
    /// Seed for the run's RNG; generated when not supplied.
    pub seed: u64,
    /// Snapshot of the mutable world state.
    pub world_state: serde_json::Value,
    /// Latest step metrics.
    pub metrics: serde_json::Value,
    /// Evaluator output, opaque JSON (set on completion).
    pub evaluation: serde_json::Value,
    /// When the run was allocated.
    pub created_at: DateTime<Utc>,
    /// When the run first entered `running`.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

/// One executed (or failed) action, as recorded in a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// The acting agent.
    pub agent_id: AgentId,
    /// The acting agent's display name.
    pub agent_name: String,
    /// The action type.
    pub action_type: ActionType,
    /// The action target, verbatim from the response.
    pub target: Option<String>,
    /// Action-specific parameters, verbatim from the response.
    pub parameters: serde_json::Value,
    /// Whether the action succeeded.
    pub success: bool,
    /// Failure reason or outcome note.
    pub detail: Option<String>,
}

/// Aggregate metrics computed at the end of each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    /// Mean health across active human agents.
    pub avg_health: f64,
    /// Mean stress across active human agents.
    pub avg_stress: f64,
    /// World hazard level at the end of the tick.
    pub hazard_level: u8,
    /// Total messages published so far in the run.
    pub message_count: u64,
    /// Conversations currently active.
    pub active_conversations: u64,
}

/// Durable snapshot of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// The run this step belongs to.
    pub run_id: RunId,
    /// Tick number (1-based; tick N produces step N).
    pub step_index: u64,
    /// World state snapshot after the tick.
    pub world_state: serde_json::Value,
    /// Actions executed this tick, in execution order.
    pub actions: Vec<ActionRecord>,
    /// Aggregate metrics.
    pub metrics: StepMetrics,
    /// When the step was finalized.
    pub created_at: DateTime<Utc>,
}

/// Where a message was addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum MessageTarget {
    /// A single agent's inbox.
    Agent(AgentId),
    /// Every agent at a location.
    Room(LocationId),
    /// Every active agent in the run.
    Broadcast,
}

impl MessageTarget {
    /// The wire form used in `to_target` fields (`broadcast`, a location
    /// key, or an agent UUID).
    pub fn as_wire(&self) -> String {
        match self {
            Self::Agent(id) => id.to_string(),
            Self::Room(id) => id.to_string(),
            Self::Broadcast => String::from("broadcast"),
        }
    }
}

/// A message as stored on the bus and in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Message identifier.
    pub id: MessageId,
    /// The run this message belongs to.
    pub run_id: RunId,
    /// Sender; `None` for system/narrator messages.
    pub from_agent_id: Option<AgentId>,
    /// Sender display name (`"System"` for sender-less messages).
    pub from_name: String,
    /// Routing target.
    pub to_target: MessageTarget,
    /// Routing type.
    pub message_type: MessageType,
    /// Message body.
    pub content: String,
    /// Optional metadata bag.
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Tick during which the message was published.
    pub step_index: u64,
    /// Publish order within the run (insertion sequence).
    pub seq: u64,
    /// Wall-clock publish time.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_target_wire_forms() {
        assert_eq!(MessageTarget::Broadcast.as_wire(), "broadcast");
        assert_eq!(
            MessageTarget::Room(LocationId::from("room1")).as_wire(),
            "room1"
        );
        let id = AgentId::new();
        assert_eq!(MessageTarget::Agent(id).as_wire(), id.to_string());
    }

    #[test]
    fn step_record_roundtrips_through_json() {
        let record = StepRecord {
            run_id: RunId::new(),
            step_index: 3,
            world_state: serde_json::json!({"hazard_level": 2}),
            actions: vec![ActionRecord {
                agent_id: AgentId::new(),
                agent_name: String::from("Ada"),
                action_type: ActionType::Move,
                target: Some(String::from("bridge")),
                parameters: serde_json::json!({}),
                success: true,
                detail: None,
            }],
            metrics: StepMetrics {
                avg_health: 9.5,
                avg_stress: 4.0,
                hazard_level: 2,
                message_count: 7,
                active_conversations: 1,
            },
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).expect("serialize");
        let restored: StepRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(record, restored);
    }
}
