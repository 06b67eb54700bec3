//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key is not usable as a blob name.
    #[error("invalid blob key: {0:?}")]
    InvalidKey(String),

    /// The store is closed.
    #[error("storage is closed")]
    Closed,

    /// The store was opened read-only.
    #[error("storage is read-only")]
    ReadOnly,
}
