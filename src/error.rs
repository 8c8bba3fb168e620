use std::path::PathBuf;

use thiserror::Error;

/// Failure of the persistence layer. Never retried internally; callers
/// decide how to report it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("failed to serialize or parse stored collection: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Failure moving an attachment between the user's filesystem and a record.
/// Kept apart from [`StorageError`]: a missing CV file says nothing about the
/// health of the store.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("failed to read attachment {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write attachment {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
