//! Agent runtime pieces for EmotionSim: instances bound to a run, the
//! memory system, persona-driven response probability, and the prompt
//! and context assembly for each role.
//!
//! The roles form a closed set ([`emosim_types::AgentRole`]); role
//! behavior differs in prompt/context assembly and scheduling, not in
//! type hierarchy. Action execution lives in the engine, which owns all
//! mutable run state.
//!
//! # Modules
//!
//! - [`instance`] -- agent instances (template + dynamic state + memory).
//! - [`memory`] -- episodic window, relationships, arrival context.
//! - [`probability`] -- the human response-probability gate.
//! - [`context`] -- system prompts and per-tick context assembly.

pub mod context;
pub mod instance;
pub mod memory;
pub mod probability;

pub use context::{
    build_context, build_evaluation_context, system_prompt, ContextBundle, ConversationView,
    CooperationView, InboxLine, LocationView, TaskView, VoteView,
};
pub use instance::AgentInstance;
pub use memory::{AgentMemory, ArrivalContext, MemoryConfig, MemoryEvent, Relationship};
pub use probability::{response_probability, should_respond, ActivitySignals};
