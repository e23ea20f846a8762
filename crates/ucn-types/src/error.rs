use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("content address must start with \"sha256:\": {0:?}")]
    MissingPrefix(String),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid chain name {name:?}: {reason}")]
    InvalidChainName { name: String, reason: String },
}
