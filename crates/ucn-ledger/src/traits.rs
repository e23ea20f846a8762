use ucn_types::{BlockHash, BlockPosition, BlockRecord, ChainName};

use crate::error::ChainResult;

/// Write boundary for chain append and rollback operations.
pub trait BlockWriter: Send + Sync {
    /// Append a block and return its content address.
    ///
    /// `previous_hash` defaults to the current tip's hash, or `""` on an
    /// empty chain.
    fn append(
        &self,
        protocol: &str,
        data: &[u8],
        previous_hash: Option<&str>,
    ) -> ChainResult<BlockHash>;

    /// Remove the block with `hash` and every block above it, returning the
    /// removed records in ascending index order.
    fn remove_block(&self, hash: &str) -> ChainResult<Vec<BlockRecord>>;

    /// Remove the block at `position` and every block above it.
    fn remove_block_by_index(&self, position: BlockPosition) -> ChainResult<Vec<BlockRecord>>;
}

/// Read boundary for chain lookups.
pub trait BlockReader: Send + Sync {
    fn chain(&self) -> &ChainName;

    fn get_block(&self, hash: &str) -> ChainResult<Option<BlockRecord>>;

    fn get_block_by_index(&self, position: BlockPosition) -> ChainResult<Option<BlockRecord>>;

    fn get_block_count(&self) -> ChainResult<u64>;

    /// Blocks with `from <= index <= to`, ascending.
    fn read_range(&self, from: u64, to: u64) -> ChainResult<Vec<BlockRecord>>;

    fn read_all(&self) -> ChainResult<Vec<BlockRecord>>;
}
