use std::path::PathBuf;

use ucn_types::BlockHash;

/// Errors from storage backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Insert would store a hash that already exists in the chain.
    #[error("duplicate block hash {0}")]
    DuplicateHash(BlockHash),

    /// Insert would leave a gap or overwrite an existing index.
    #[error("index conflict: next index is {expected}, got {actual}")]
    IndexConflict { expected: u64, actual: u64 },

    /// A chain log failed its integrity checks during replay.
    #[error("corrupt chain log {path:?} at offset {offset}: {reason}")]
    CorruptLog {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// A lock guarding backend state was poisoned by a panic.
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
}

impl BackendError {
    /// Returns `true` for errors raised by the unique hash or unique index
    /// constraints on insert.
    pub fn is_uniqueness_violation(&self) -> bool {
        matches!(self, Self::DuplicateHash(_) | Self::IndexConflict { .. })
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
