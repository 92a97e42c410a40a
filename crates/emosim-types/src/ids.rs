//! Type-safe identifier wrappers.
//!
//! Run-scoped entities (agents, runs, messages, tasks, ...) use UUID v7
//! (time-ordered) newtypes so identifiers cannot be mixed up at compile
//! time and index well in the database.
//!
//! Locations and items are the exception: they are addressed by the keys
//! the scenario author wrote (`"room1"`, `"first_aid_kit"`), and new
//! locations are created on the fly from whatever name an agent targeted.
//! Those two are therefore string newtypes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an agent instance bound to a run.
    AgentId
}

define_id! {
    /// Unique identifier for a scenario template.
    ScenarioId
}

define_id! {
    /// Unique identifier for a single execution of a scenario.
    RunId
}

define_id! {
    /// Unique identifier for a message on the bus.
    MessageId
}

define_id! {
    /// Unique identifier for a conversation between co-located agents.
    ConversationId
}

define_id! {
    /// Unique identifier for a shared cooperation task.
    TaskId
}

define_id! {
    /// Unique identifier for an open vote.
    VoteId
}

/// Generates a newtype wrapper around `String` for scenario-keyed names.
macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a key from anything string-like.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_key! {
    /// Key of a location node in the world graph (scenario-declared or
    /// dynamically created from the name an agent targeted).
    LocationId
}

define_key! {
    /// Key of an item definition; containers refer to items by this key.
    ItemId
}
