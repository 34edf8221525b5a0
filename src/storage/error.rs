//! Storage Error Types

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error (fact files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary record error (partition metadata)
    #[error("Record encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Staging path already exists, presumably another writer
    #[error("Staging file already exists: {}", .0.display())]
    ConcurrentWrite(PathBuf),

    /// Metadata error
    #[error("Metadata error: {0}")]
    Metadata(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
