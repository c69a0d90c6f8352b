//! Error types for the knowledge store

use thiserror::Error;
use uuid::Uuid;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the knowledge store
///
/// The first group are caller errors: expected outcomes of bad input or a
/// conflicting store state. They leave the store unchanged. Everything else is
/// fatal and is never retried.
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before touching storage
    #[error("{0}")]
    Validation(String),

    /// Referenced memory node does not exist
    #[error("Memory node not found: {id}")]
    NotFound { id: Uuid },

    /// An edge endpoint does not exist
    #[error("Invalid ids provided.")]
    InvalidIds,

    /// At least one requested edge already exists
    #[error("Some of the requested memory nodes are already linked.")]
    AlreadyLinked,

    /// The memory to link new memories to does not exist
    #[error("Invalid source memory node id provided: {id}")]
    InvalidReference { id: Uuid },

    /// SQLite database error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database corruption or schema mismatch
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    ConnectionError(#[from] tokio_rusqlite::Error),
}

impl Error {
    /// Create a database error with a message
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(id: Uuid) -> Self {
        Self::NotFound { id }
    }

    /// Whether this error is an expected outcome the caller can act on
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound { .. }
                | Self::InvalidIds
                | Self::AlreadyLinked
                | Self::InvalidReference { .. }
        )
    }
}
