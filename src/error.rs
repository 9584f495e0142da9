//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::path::PathBuf;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key was never set or has been deleted
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key is still stored but its TTL has lapsed
    #[error("Key expired: {0}")]
    Expired(String),

    /// The backing database could not be opened, read, written or flushed
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The storage location could not be inspected or created
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The storage location exists but is not a directory
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Closing could not fold the write-ahead log back into the database
    #[error("WAL checkpoint incomplete for {0}")]
    Checkpoint(String),

    /// A background sweep failed to delete expired rows
    #[error("Purge failed: {0}")]
    Purge(#[source] rusqlite::Error),
}

impl CacheError {
    /// True for the two "miss" outcomes of a lookup.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::NotFound(_) | CacheError::Expired(_))
    }

    /// True when the backing storage itself failed.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            CacheError::Storage(_)
                | CacheError::Io(_)
                | CacheError::NotADirectory(_)
                | CacheError::Checkpoint(_)
        )
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
