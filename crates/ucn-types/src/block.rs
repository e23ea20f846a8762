use serde::{Deserialize, Serialize};

use crate::hash::BlockHash;

/// A block as held in a chain.
///
/// The block's own hash is not part of the record: it is derived from
/// `(protocol, previous_hash, data)` by the canonical codec and content
/// hasher in `ucn-crypto`. `data` is an opaque payload the ledger never
/// interprets.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Short tag naming the payload's schema.
    pub protocol: String,
    /// Opaque payload bytes.
    pub data: Vec<u8>,
    /// Content address of the block at `index - 1`, or `""` for genesis.
    pub previous_hash: String,
    /// Zero-based position in the chain.
    pub index: u64,
}

impl BlockRecord {
    pub fn new(
        protocol: impl Into<String>,
        data: impl Into<Vec<u8>>,
        previous_hash: impl Into<String>,
        index: u64,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            data: data.into(),
            previous_hash: previous_hash.into(),
            index,
        }
    }

    /// Returns `true` for the block at index 0.
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

impl std::fmt::Debug for BlockRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRecord")
            .field("protocol", &self.protocol)
            .field("data_len", &self.data.len())
            .field("previous_hash", &self.previous_hash)
            .field("index", &self.index)
            .finish()
    }
}

/// A block record together with its derived content address.
///
/// This is the row a storage backend persists. Backends index it by both
/// `hash` and `record.index`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlock {
    pub hash: BlockHash,
    pub record: BlockRecord,
}

impl StoredBlock {
    pub fn new(hash: BlockHash, record: BlockRecord) -> Self {
        Self { hash, record }
    }

    pub fn index(&self) -> u64 {
        self.record.index
    }

    pub fn into_record(self) -> BlockRecord {
        self.record
    }
}

/// Selects a block by position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockPosition {
    /// The block with the highest index.
    Tip,
    /// The block at an exact index.
    Index(u64),
}

impl BlockPosition {
    /// Map a signed index where `-1` names the tip.
    ///
    /// Returns `None` for any other negative value, which can never
    /// address a block.
    pub fn from_signed(index: i64) -> Option<Self> {
        match index {
            -1 => Some(Self::Tip),
            i if i >= 0 => Some(Self::Index(i as u64)),
            _ => None,
        }
    }
}

impl From<u64> for BlockPosition {
    fn from(index: u64) -> Self {
        Self::Index(index)
    }
}

impl std::fmt::Display for BlockPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tip => write!(f, "tip"),
            Self::Index(i) => write!(f, "#{i}"),
        }
    }
}
