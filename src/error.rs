//! Error taxonomy for the inventory layer.
//!
//! "No row found" is never an error: reads return `Option`. Insert conflicts
//! and update/delete on a missing id are reported through
//! [`WriteOutcome::rows_affected`](crate::WriteOutcome) instead.

use thiserror::Error;

/// Errors returned by inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Engine-level failure: I/O, constraint violation, malformed SQL.
    #[error("storage error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("failed to acquire a read connection: {0}")]
    Pool(#[from] r2d2::Error),

    /// The caller cancelled the operation before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The record was rejected before it reached the store.
    #[error("invalid item: {0}")]
    InvariantViolation(String),

    /// A setting is outside its accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The layer has been closed and no longer accepts work.
    #[error("inventory is closed")]
    Closed,

    #[error("writer thread panicked")]
    WriterPanic,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background read task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl InventoryError {
    /// True when SQLite aborted a statement through its interrupt handle.
    pub fn is_interrupt(&self) -> bool {
        let Self::Store(e) = self else {
            return false;
        };
        e.sqlite_error_code() == Some(rusqlite::ErrorCode::OperationInterrupted)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = InventoryError> = std::result::Result<T, E>;
