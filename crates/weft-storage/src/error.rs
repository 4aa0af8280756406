//! Storage error types.

use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database rejected or failed a statement.
    #[error("database error: {0}")]
    Database(String),

    /// A value could not be converted for the store.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// The store connection is gone.
    #[error("connection error: {0}")]
    Connection(String),
}

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;
