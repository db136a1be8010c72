//! Error types for scene mirror operations.

use thiserror::Error;

/// Result type for scene mirror operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while mirroring a scene.
///
/// None of these are fatal. The reconciler logs them and leaves the
/// registry untouched for the offending message.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Entity not found in the registry.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// The parent an entity should attach to is not registered yet.
    #[error("Parent {parent} of {name} is not registered")]
    ParentMissing {
        /// Entity that was being created.
        name: String,
        /// Missing parent name.
        parent: String,
    },

    /// A visual's name is not nested under its parent's name.
    #[error("Entity {name} is not nested under parent {parent}")]
    NameOutsideParent {
        /// Entity that was being created.
        name: String,
        /// Parent it was attached to.
        parent: String,
    },

    /// The world root cannot be replaced or removed.
    #[error("The world root cannot be modified: {0}")]
    RootProtected(String),

    /// Request verb that the mirror does not understand.
    #[error("Unknown request verb: {0}")]
    UnknownVerb(String),

    /// Geometry kind that the mirror does not understand.
    #[error("Unknown geometry for visual: {0}")]
    UnknownGeometry(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error while loading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
