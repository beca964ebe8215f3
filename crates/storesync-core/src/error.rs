//! Error types for storesync-core

use thiserror::Error;

use crate::models::JobStatus;

/// Result type alias using storesync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in storesync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A job was asked to move to a state its current state cannot reach
    #[error("Invalid job transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    /// Storefront request failed
    #[error(transparent)]
    Storefront(#[from] crate::storefront::StorefrontError),

    /// Job runner is no longer accepting work
    #[error("Job runner is not running")]
    RunnerStopped,
}
