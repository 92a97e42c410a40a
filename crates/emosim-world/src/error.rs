//! Error types for world operations.

use emosim_types::{ItemId, LocationId};

/// Errors that can occur mutating the world.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// A location key was not found in the graph.
    #[error("location '{0}' not found")]
    LocationNotFound(LocationId),

    /// A location with the same key already exists.
    #[error("location '{0}' already exists")]
    DuplicateLocation(LocationId),

    /// An item was not present in the container it was expected in.
    #[error("item '{item}' not present in {container}")]
    ItemNotInContainer {
        /// The missing item.
        item: ItemId,
        /// Human-readable container description.
        container: String,
    },

    /// An item has no definition in the registry.
    #[error("item '{0}' is not defined")]
    UndefinedItem(ItemId),

    /// A write to a dynamics key violated its declared bounds or type.
    #[error("world-state key '{key}' rejected: {reason}")]
    DynamicsRejected {
        /// The key being written.
        key: String,
        /// Why the write was rejected.
        reason: String,
    },

    /// The single-container invariant does not hold.
    #[error("item '{0}' appears in more than one container")]
    ContainerInvariantViolated(ItemId),
}
