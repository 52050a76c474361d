//! Database error types.

use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to open or create the database.
    #[error("failed to open database: {0}")]
    Open(String),

    /// Migration execution failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// A stored or submitted value could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The submission cannot be persisted as given.
    #[error("invalid submission: {0}")]
    InvalidInput(String),

    /// The object store rejected an upload or removal.
    #[error("object store error for {key}: {message}")]
    ObjectStore {
        /// Object key
        key: String,
        /// Underlying failure
        message: String,
    },

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error during database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
