//! In-memory chain partition and its undo-logged transaction.
//!
//! Both backends keep the live state of each chain in a [`ChainPartition`].
//! A [`PartitionTxn`] mutates the partition in place, records an undo entry
//! per change, and journals the change as a [`LogOp`] so durable backends
//! can persist exactly what the transaction did.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ucn_types::{BlockHash, StoredBlock};

use crate::error::{BackendError, BackendResult};
use crate::traits::ChainTransaction;

/// A single change to a chain, as journaled by a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOp {
    /// Append a block at the end of the chain.
    Insert(StoredBlock),
    /// Delete every block with `index >= from`.
    Truncate { from: u64 },
}

/// Live state of one chain: blocks by position plus a hash index.
#[derive(Debug, Default)]
pub(crate) struct ChainPartition {
    blocks: Vec<StoredBlock>,
    by_hash: HashMap<BlockHash, u64>,
}

impl ChainPartition {
    pub(crate) fn len(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub(crate) fn blocks(&self) -> &[StoredBlock] {
        &self.blocks
    }

    fn tip(&self) -> Option<&StoredBlock> {
        self.blocks.last()
    }

    fn get(&self, index: u64) -> Option<&StoredBlock> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    fn find(&self, hash: &BlockHash) -> Option<&StoredBlock> {
        self.by_hash.get(hash).and_then(|&index| self.get(index))
    }

    fn range(&self, from: u64, to: u64) -> Vec<StoredBlock> {
        if from > to || from >= self.len() {
            return Vec::new();
        }
        let end = to.min(self.len() - 1);
        self.blocks[from as usize..=end as usize].to_vec()
    }

    /// Append with the unique-hash and contiguous-index constraints.
    fn push(&mut self, block: StoredBlock) -> BackendResult<()> {
        if self.by_hash.contains_key(&block.hash) {
            return Err(BackendError::DuplicateHash(block.hash));
        }
        if block.index() != self.len() {
            return Err(BackendError::IndexConflict {
                expected: self.len(),
                actual: block.index(),
            });
        }
        self.restore(block);
        Ok(())
    }

    /// Append without checks. Only for blocks that were already validated.
    fn restore(&mut self, block: StoredBlock) {
        self.by_hash.insert(block.hash, block.index());
        self.blocks.push(block);
    }

    fn truncate_from(&mut self, from: u64) -> Vec<StoredBlock> {
        if from >= self.len() {
            return Vec::new();
        }
        let removed = self.blocks.split_off(from as usize);
        for block in &removed {
            self.by_hash.remove(&block.hash);
        }
        removed
    }

    /// Apply a journaled change, enforcing the same constraints as a live
    /// transaction.
    pub(crate) fn apply(&mut self, op: LogOp) -> BackendResult<()> {
        match op {
            LogOp::Insert(block) => self.push(block),
            LogOp::Truncate { from } => {
                self.truncate_from(from);
                Ok(())
            }
        }
    }
}

enum Undo {
    Pushed,
    Truncated(Vec<StoredBlock>),
}

/// Transaction over an exclusively borrowed partition.
///
/// Dropping the transaction without calling [`rollback`](Self::rollback)
/// keeps its changes.
pub(crate) struct PartitionTxn<'a> {
    partition: &'a mut ChainPartition,
    undo: Vec<Undo>,
    journal: Vec<LogOp>,
}

impl<'a> PartitionTxn<'a> {
    pub(crate) fn begin(partition: &'a mut ChainPartition) -> Self {
        Self {
            partition,
            undo: Vec::new(),
            journal: Vec::new(),
        }
    }

    /// Changes made so far, in order.
    pub(crate) fn journal(&self) -> &[LogOp] {
        &self.journal
    }

    pub(crate) fn commit(self) {}

    /// Revert every change, newest first.
    pub(crate) fn rollback(mut self) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Pushed => {
                    let len = self.partition.len();
                    self.partition.truncate_from(len.saturating_sub(1));
                }
                Undo::Truncated(blocks) => {
                    for block in blocks {
                        self.partition.restore(block);
                    }
                }
            }
        }
        self.journal.clear();
    }
}

impl ChainTransaction for PartitionTxn<'_> {
    fn tip(&self) -> BackendResult<Option<StoredBlock>> {
        Ok(self.partition.tip().cloned())
    }

    fn get_by_hash(&self, hash: &BlockHash) -> BackendResult<Option<StoredBlock>> {
        Ok(self.partition.find(hash).cloned())
    }

    fn get_by_index(&self, index: u64) -> BackendResult<Option<StoredBlock>> {
        Ok(self.partition.get(index).cloned())
    }

    fn count(&self) -> BackendResult<u64> {
        Ok(self.partition.len())
    }

    fn range(&self, from: u64, to: u64) -> BackendResult<Vec<StoredBlock>> {
        Ok(self.partition.range(from, to))
    }

    fn insert(&mut self, block: StoredBlock) -> BackendResult<()> {
        self.partition.push(block.clone())?;
        self.undo.push(Undo::Pushed);
        self.journal.push(LogOp::Insert(block));
        Ok(())
    }

    fn delete_from(&mut self, from: u64) -> BackendResult<Vec<StoredBlock>> {
        let removed = self.partition.truncate_from(from);
        if !removed.is_empty() {
            self.undo.push(Undo::Truncated(removed.clone()));
            self.journal.push(LogOp::Truncate { from });
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ucn_crypto::ContentHasher;
    use ucn_types::BlockRecord;

    fn block(index: u64, previous: &str, payload: &str) -> StoredBlock {
        let record = BlockRecord::new("test", payload.as_bytes().to_vec(), previous, index);
        StoredBlock::new(ContentHasher::block_hash(&record), record)
    }

    fn filled(count: u64) -> ChainPartition {
        let mut partition = ChainPartition::default();
        let mut previous = String::new();
        for i in 0..count {
            let b = block(i, &previous, &format!("block-{i}"));
            previous = b.hash.to_string();
            partition.push(b).unwrap();
        }
        partition
    }

    #[test]
    fn push_rejects_duplicate_hash() {
        let mut partition = filled(1);
        let again = partition.blocks()[0].clone();
        let err = partition.push(again).unwrap_err();
        assert!(matches!(err, BackendError::DuplicateHash(_)));
    }

    #[test]
    fn push_rejects_index_gap() {
        let mut partition = filled(1);
        let err = partition.push(block(5, "", "gap")).unwrap_err();
        assert!(matches!(
            err,
            BackendError::IndexConflict {
                expected: 1,
                actual: 5
            }
        ));
    }

    #[test]
    fn range_is_inclusive_and_clamped() {
        let partition = filled(5);
        let indices = |v: Vec<StoredBlock>| v.iter().map(StoredBlock::index).collect::<Vec<_>>();
        assert_eq!(indices(partition.range(1, 3)), vec![1, 2, 3]);
        assert_eq!(indices(partition.range(3, 100)), vec![3, 4]);
        assert!(partition.range(3, 1).is_empty());
        assert!(partition.range(9, 12).is_empty());
    }

    #[test]
    fn truncate_clears_hash_index() {
        let mut partition = filled(3);
        let hash = partition.blocks()[2].hash;
        let removed = partition.truncate_from(1);
        assert_eq!(removed.len(), 2);
        assert!(partition.find(&hash).is_none());
        assert_eq!(partition.len(), 1);
    }

    #[test]
    fn rollback_restores_previous_state() {
        let mut partition = filled(3);
        let before: Vec<StoredBlock> = partition.blocks().to_vec();

        let mut txn = PartitionTxn::begin(&mut partition);
        let removed = txn.delete_from(1).unwrap();
        assert_eq!(removed.len(), 2);
        txn.insert(block(1, &before[0].hash.to_string(), "replacement"))
            .unwrap();
        assert_eq!(txn.journal().len(), 2);
        txn.rollback();

        assert_eq!(partition.blocks(), before.as_slice());
        for b in &before {
            assert_eq!(partition.find(&b.hash), Some(b));
        }
    }

    #[test]
    fn commit_keeps_changes_and_journal_records_them() {
        let mut partition = filled(2);
        let mut txn = PartitionTxn::begin(&mut partition);
        txn.delete_from(1).unwrap();
        assert_eq!(txn.journal(), &[LogOp::Truncate { from: 1 }]);
        txn.commit();
        assert_eq!(partition.len(), 1);
    }

    #[test]
    fn deleting_past_the_end_is_not_journaled() {
        let mut partition = filled(2);
        let mut txn = PartitionTxn::begin(&mut partition);
        assert!(txn.delete_from(2).unwrap().is_empty());
        assert!(txn.journal().is_empty());
    }
}
