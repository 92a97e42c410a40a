//! Closed enumerations shared across the simulation crates.
//!
//! All wire representations are `snake_case` to match the persisted form
//! and the event stream payloads.

use serde::{Deserialize, Serialize};

/// The role an agent plays in a run.
///
/// Roles form a closed set; role-specific capabilities (for example
/// `environment_update`) are guarded by a role check at action execution
/// rather than by separate agent subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Roleplays a person with a persona; scheduled in seeded random order.
    Human,
    /// Controls world dynamics (hazard, events); runs before humans.
    Environment,
    /// Meta-agent steering the narrative; runs after humans, every tick.
    Designer,
    /// Scores the completed run; invoked once on the terminal step.
    Evaluator,
}

impl AgentRole {
    /// Whether this role is allowed to mutate world state directly.
    pub const fn can_mutate_world(self) -> bool {
        matches!(self, Self::Environment)
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Allocated but not started.
    Pending,
    /// Tick loop is executing.
    Running,
    /// Suspended; may be resumed, stepped, or stopped.
    Paused,
    /// Reached `max_steps` or a scenario terminal condition.
    Completed,
    /// Stopped by an operator command.
    Stopped,
    /// Abandoned before start.
    Cancelled,
    /// A fatal error (persistence, invariant violation) ended the run.
    Error,
}

impl RunStatus {
    /// Whether no further ticks will run in this status.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Stopped | Self::Cancelled | Self::Error
        )
    }

    /// Whether the transition `self -> next` is allowed by the state machine.
    ///
    /// `pending -> running`, `running <-> paused`,
    /// `running -> {completed, stopped, error}`,
    /// `paused -> {running, stopped, error}`, `pending -> cancelled`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Cancelled)
                | (
                    Self::Running,
                    Self::Paused | Self::Completed | Self::Stopped | Self::Error
                )
                | (Self::Paused, Self::Running | Self::Stopped | Self::Error)
        )
    }
}

/// A control command issued against a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// `pending -> running`.
    Start,
    /// `running -> paused`.
    Pause,
    /// `paused -> running`.
    Resume,
    /// Any non-terminal status `-> stopped`.
    Stop,
    /// Execute exactly one tick from `paused`, then return to `paused`.
    Step,
}

/// How a message is routed by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Delivered to a single agent's inbox.
    Direct,
    /// Delivered to every agent at the target location.
    Room,
    /// Delivered to every active agent in the run.
    Broadcast,
}

/// Lifecycle status of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Participants are taking turns.
    Active,
    /// No participant has spoken for two consecutive ticks.
    Paused,
    /// Fewer than two participants remain or the turn cap was reached.
    Ended,
}

/// Lifecycle status of a cooperation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Proposed, awaiting assignees.
    Proposed,
    /// Has at least one assignee.
    InProgress,
    /// Progress reached 100 or completion was reported.
    Completed,
}

/// Relationship sentiment toward another agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    /// Favorable disposition.
    Positive,
    /// No strong disposition either way.
    Neutral,
    /// Unfavorable disposition.
    Negative,
}

/// The catalog of actions an agent can emit in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Move toward a target location via the movement resolver.
    Move,
    /// Pick up an item from the current location.
    Take,
    /// Put an inventory item down at the current location.
    Drop,
    /// Apply an inventory item's properties (e.g. healing).
    Use,
    /// Free-form interaction with a target; no mandatory state effect.
    Interact,
    /// Reveal hidden items at the current location.
    Search,
    /// Shorthand for publishing a message.
    Speak,
    /// Do nothing this turn.
    Wait,
    /// Do nothing, recorded as deliberate reflection.
    Reflect,
    /// Targeted interact that may relieve a co-located agent.
    Help,
    /// Join the conversation at the current location.
    JoinConversation,
    /// Leave the conversation at the current location.
    LeaveConversation,
    /// Create a cooperation task (delegated to the coordinator).
    ProposeTask,
    /// Assign oneself to a task.
    AcceptTask,
    /// Update a task's progress.
    ReportProgress,
    /// Open a vote for exactly the next tick.
    CallForVote,
    /// Mutate named world-state keys (environment role only).
    EnvironmentUpdate,
    /// Adjust one agent's health or stress (environment role only).
    AffectAgent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Stopped.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::Error.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
    }

    #[test]
    fn valid_transitions() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Cancelled));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Paused));
        assert!(RunStatus::Paused.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Paused.can_transition_to(RunStatus::Stopped));
    }

    #[test]
    fn invalid_transitions() {
        assert!(!RunStatus::Pending.can_transition_to(RunStatus::Paused));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Stopped.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Paused.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Cancelled));
    }

    #[test]
    fn action_type_snake_case_wire_format() {
        let json = serde_json::to_string(&ActionType::JoinConversation).expect("serialize");
        assert_eq!(json, "\"join_conversation\"");
        let parsed: ActionType =
            serde_json::from_str("\"environment_update\"").expect("deserialize");
        assert_eq!(parsed, ActionType::EnvironmentUpdate);
    }

    #[test]
    fn only_environment_mutates_world() {
        assert!(AgentRole::Environment.can_mutate_world());
        assert!(!AgentRole::Human.can_mutate_world());
        assert!(!AgentRole::Designer.can_mutate_world());
        assert!(!AgentRole::Evaluator.can_mutate_world());
    }
}
