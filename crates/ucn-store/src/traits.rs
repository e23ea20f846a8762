use ucn_types::{BlockHash, ChainName, StoredBlock};

use crate::error::{BackendError, BackendResult};

/// Durable, chain-partitioned block storage.
///
/// All implementations must satisfy these invariants:
/// - `transaction` gives `work` exclusive access to one chain. Concurrent
///   transactions on the same chain are serialized; transactions on
///   different chains do not wait for each other.
/// - If `work` returns `Ok`, every change it made is committed atomically.
///   If it returns `Err`, or the commit itself fails, no change is visible.
/// - A failed commit surfaces as `E::from(BackendError)`.
pub trait BlockBackend: Send + Sync {
    /// Run `work` inside a transaction on `chain`.
    fn transaction<T, E, F>(&self, chain: &ChainName, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ChainTransaction) -> Result<T, E>,
        E: From<BackendError>;

    /// Names of all chains holding at least one block, sorted.
    fn chains(&self) -> BackendResult<Vec<ChainName>>;
}

/// Read-modify-write view of one chain inside a transaction.
///
/// Reads observe the transaction's own earlier writes.
pub trait ChainTransaction {
    /// The block with the highest index, if any.
    fn tip(&self) -> BackendResult<Option<StoredBlock>>;

    /// Point lookup by content address.
    fn get_by_hash(&self, hash: &BlockHash) -> BackendResult<Option<StoredBlock>>;

    /// Point lookup by index.
    fn get_by_index(&self, index: u64) -> BackendResult<Option<StoredBlock>>;

    /// Number of blocks in the chain.
    fn count(&self) -> BackendResult<u64>;

    /// Blocks with `from <= index <= to`, ascending. Out-of-range bounds are
    /// clamped; `from > to` yields nothing.
    fn range(&self, from: u64, to: u64) -> BackendResult<Vec<StoredBlock>>;

    /// Insert a block at the end of the chain.
    ///
    /// Fails with [`BackendError::DuplicateHash`] if the hash is already
    /// stored and with [`BackendError::IndexConflict`] unless the block's
    /// index equals the current count.
    fn insert(&mut self, block: StoredBlock) -> BackendResult<()>;

    /// Delete every block with `index >= from` and return them ascending.
    fn delete_from(&mut self, from: u64) -> BackendResult<Vec<StoredBlock>>;
}
