//! Error types for the social subsystems.

use emosim_types::{AgentId, ConversationId, TaskId};

/// Errors raised by the bus, conversations, and coordinator.
#[derive(Debug, thiserror::Error)]
pub enum SocialError {
    /// A task id was not found.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// A completed task cannot be mutated further.
    #[error("task {0} is already completed")]
    TaskCompleted(TaskId),

    /// Reported progress was outside 0-100.
    #[error("progress {0} outside 0..=100")]
    ProgressOutOfRange(i64),

    /// Task priority was outside 1-10.
    #[error("priority {0} outside 1..=10")]
    PriorityOutOfRange(i64),

    /// A vote needs at least one option.
    #[error("a vote needs at least one option")]
    EmptyVoteOptions,

    /// A conversation id was not found.
    #[error("conversation {0} not found")]
    ConversationNotFound(ConversationId),

    /// The agent is not part of the conversation at its location.
    #[error("agent {0} is not in a conversation here")]
    NotInConversation(AgentId),
}
