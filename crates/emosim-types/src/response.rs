//! The structured response an agent produces each tick.
//!
//! The oracle is untrusted: this is the shape the parser targets, and the
//! engine re-validates every field before applying anything (unknown
//! targets, out-of-range deltas, role violations are all handled at
//! execution time, not here).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enums::{ActionType, MessageType};

/// One action emitted by an agent. Actions apply in emission order; a
/// failing action does not abort the ones after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    /// The action type.
    pub action_type: ActionType,
    /// Target name: a location key, item key, or agent name, depending on
    /// the action.
    #[serde(default)]
    pub target: Option<String>,
    /// Action-specific parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// The message an agent wants to publish this tick, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Message body. An empty body counts as "chose not to speak".
    pub content: String,
    /// Agent name, room key, or the literal `broadcast`. Resolved by the
    /// engine at publish time.
    #[serde(default = "default_target")]
    pub to_target: String,
    /// Requested routing type.
    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
    /// Optional metadata carried through to the stored record.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

fn default_target() -> String {
    String::from("broadcast")
}

const fn default_message_type() -> MessageType {
    MessageType::Broadcast
}

/// Self-reported state deltas. Applied after actions, clamped to range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateChanges {
    /// New health value, clamped to `[0, 10]`.
    #[serde(default)]
    pub health: Option<f64>,
    /// New stress value, clamped to `[0, 10]`.
    #[serde(default)]
    pub stress: Option<f64>,
    /// Anything else the agent reported; recorded but not applied.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl StateChanges {
    /// Whether there is nothing to apply or record.
    pub fn is_empty(&self) -> bool {
        self.health.is_none() && self.stress.is_none() && self.extra.is_empty()
    }
}

/// The full parsed response for one agent tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Actions to execute, in order. May be empty.
    #[serde(default)]
    pub actions: Vec<AgentAction>,
    /// Optional message, published after all actions and state changes.
    #[serde(default)]
    pub message: Option<AgentMessage>,
    /// Bounded self-reported deltas, applied after actions.
    #[serde(default)]
    pub state_changes: StateChanges,
    /// Internal reasoning; logged, never interpreted.
    #[serde(default)]
    pub reasoning: String,
}

impl AgentResponse {
    /// A response that does nothing (used when the agent skips a tick).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the message field carries actual content.
    pub fn has_spoken(&self) -> bool {
        self.message
            .as_ref()
            .is_some_and(|m| !m.content.trim().is_empty())
    }
}
