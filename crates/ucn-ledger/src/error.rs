use ucn_store::BackendError;
use ucn_types::ChainName;

/// Errors produced by chain store operations.
///
/// A lookup that finds nothing is never an error; it is `Ok(None)` or an
/// empty list.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The supplied or defaulted previous hash is not the current tip's
    /// hash, or the new block's hash collides with a stored one.
    #[error("invalid previous block hash {supplied:?} on {chain}: tip is {tip}")]
    InvalidPreviousBlockHash {
        chain: ChainName,
        supplied: String,
        tip: String,
    },

    /// A non-empty previous hash was supplied while the chain is empty.
    #[error("missing genesis block on {chain}: previous hash {supplied:?} on an empty chain")]
    MissingGenesisBlock { chain: ChainName, supplied: String },

    #[error("invalid index range: from={from}, to={to}")]
    InvalidRange { from: u64, to: u64 },

    /// The storage backend failed; the operation had no effect.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl ChainError {
    /// Returns `true` for chain-integrity rejections, which a caller may
    /// resolve by re-reading the tip and resubmitting.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidPreviousBlockHash { .. } | Self::MissingGenesisBlock { .. }
        )
    }
}

/// Result alias for chain store operations.
pub type ChainResult<T> = Result<T, ChainError>;
