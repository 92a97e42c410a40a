//! Social subsystems for EmotionSim: message routing, conversations,
//! cooperation, and loop detection.
//!
//! # Modules
//!
//! - [`bus`] -- direct/room/broadcast delivery with ordered history.
//! - [`conversation`] -- co-location conversations with round-robin turns.
//! - [`coordinator`] -- shared goals, tasks, and one-tick votes.
//! - [`loopcheck`] -- repeated-behavior heuristics and suggestions.
//! - [`error`] -- shared error type.

pub mod bus;
pub mod conversation;
pub mod coordinator;
pub mod error;
pub mod loopcheck;

pub use bus::{HistoryFilter, MessageBus, MessageDraft};
pub use conversation::{Conversation, ConversationManager, DEFAULT_MAX_TURNS_PER_AGENT};
pub use coordinator::{CooperationCoordinator, Task, Vote, VoteOutcome};
pub use error::SocialError;
pub use loopcheck::LoopDetector;
