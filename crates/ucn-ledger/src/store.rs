use std::sync::Arc;

use tracing::{debug, info};
use ucn_crypto::ContentHasher;
use ucn_store::{BackendResult, BlockBackend, ChainTransaction};
use ucn_types::{BlockHash, BlockPosition, BlockRecord, ChainName, StoredBlock};

use crate::error::{ChainError, ChainResult};
use crate::traits::{BlockReader, BlockWriter};
use crate::validation::{ChainValidator, ValidationReport};

/// Hash-chained block store over one named chain.
///
/// Every operation runs in a single backend transaction scoped to the
/// chain, so the tip an append links to is the tip it commits on top of.
/// Several stores may share one backend; each owns only its own chain.
pub struct ChainStore<B: BlockBackend> {
    backend: Arc<B>,
    chain: ChainName,
}

impl<B: BlockBackend> ChainStore<B> {
    pub fn open(backend: Arc<B>, chain: ChainName) -> Self {
        Self { backend, chain }
    }

    /// Open the chain named [`ChainName::DEFAULT`].
    pub fn open_default(backend: Arc<B>) -> Self {
        Self::open(backend, ChainName::default())
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// The block with the highest index.
    pub fn tip(&self) -> ChainResult<Option<BlockRecord>> {
        self.get_block_by_index(BlockPosition::Tip)
    }

    pub fn tip_hash(&self) -> ChainResult<Option<BlockHash>> {
        self.backend
            .transaction(&self.chain, |txn| -> ChainResult<Option<BlockHash>> {
                Ok(txn.tip()?.map(|tip| tip.hash))
            })
    }

    /// Audit every chain invariant.
    pub fn verify(&self) -> ChainResult<ValidationReport> {
        ChainValidator::validate(self)
    }

    /// Delete the located block and everything above it in one transaction.
    fn remove_from<L>(&self, locate: L) -> ChainResult<Vec<BlockRecord>>
    where
        L: FnOnce(&dyn ChainTransaction) -> BackendResult<Option<StoredBlock>>,
    {
        let removed = self
            .backend
            .transaction(&self.chain, |txn| -> ChainResult<Vec<StoredBlock>> {
                let Some(target) = locate(&*txn)? else {
                    return Ok(Vec::new());
                };
                Ok(txn.delete_from(target.index())?)
            })?;

        if let Some(first) = removed.first() {
            info!(
                chain = %self.chain,
                from = first.index(),
                count = removed.len(),
                hash = %first.hash,
                "blocks rolled back"
            );
        }
        Ok(removed.into_iter().map(StoredBlock::into_record).collect())
    }
}

impl<B: BlockBackend> BlockWriter for ChainStore<B> {
    fn append(
        &self,
        protocol: &str,
        data: &[u8],
        previous_hash: Option<&str>,
    ) -> ChainResult<BlockHash> {
        let chain = &self.chain;
        let (hash, index) = self
            .backend
            .transaction(chain, |txn| -> ChainResult<(BlockHash, u64)> {
                let tip = txn.tip()?;
                let tip_hash = tip.as_ref().map(|t| t.hash.to_string());
                let previous = match previous_hash {
                    Some(supplied) => supplied.to_string(),
                    None => tip_hash.clone().unwrap_or_default(),
                };

                let index = match (&tip, &tip_hash) {
                    (Some(tip), Some(tip_hash)) => {
                        if previous != *tip_hash {
                            debug!(
                                chain = %chain,
                                supplied = %previous,
                                tip = %tip_hash,
                                "stale previous hash"
                            );
                            return Err(ChainError::InvalidPreviousBlockHash {
                                chain: chain.clone(),
                                supplied: previous,
                                tip: tip_hash.clone(),
                            });
                        }
                        tip.index() + 1
                    }
                    _ => {
                        if !previous.is_empty() {
                            return Err(ChainError::MissingGenesisBlock {
                                chain: chain.clone(),
                                supplied: previous,
                            });
                        }
                        0
                    }
                };

                let record = BlockRecord::new(protocol, data, previous, index);
                let hash = ContentHasher::block_hash(&record);
                match txn.insert(StoredBlock::new(hash, record)) {
                    Ok(()) => Ok((hash, index)),
                    Err(err) if err.is_uniqueness_violation() => {
                        debug!(chain = %chain, hash = %hash, error = %err, "insert rejected");
                        Err(ChainError::InvalidPreviousBlockHash {
                            chain: chain.clone(),
                            supplied: previous_hash.map(str::to_string).unwrap_or_default(),
                            tip: tip_hash.unwrap_or_default(),
                        })
                    }
                    Err(err) => Err(err.into()),
                }
            })?;

        debug!(
            chain = %chain,
            index,
            hash = %hash,
            protocol,
            len = data.len(),
            "block appended"
        );
        Ok(hash)
    }

    fn remove_block(&self, hash: &str) -> ChainResult<Vec<BlockRecord>> {
        let Ok(hash) = BlockHash::parse(hash) else {
            debug!(chain = %self.chain, hash, "remove of malformed hash ignored");
            return Ok(Vec::new());
        };
        self.remove_from(|txn| txn.get_by_hash(&hash))
    }

    fn remove_block_by_index(&self, position: BlockPosition) -> ChainResult<Vec<BlockRecord>> {
        self.remove_from(|txn| locate(txn, position))
    }
}

impl<B: BlockBackend> BlockReader for ChainStore<B> {
    fn chain(&self) -> &ChainName {
        &self.chain
    }

    fn get_block(&self, hash: &str) -> ChainResult<Option<BlockRecord>> {
        let Ok(hash) = BlockHash::parse(hash) else {
            return Ok(None);
        };
        self.backend
            .transaction(&self.chain, |txn| -> ChainResult<Option<BlockRecord>> {
                Ok(txn.get_by_hash(&hash)?.map(StoredBlock::into_record))
            })
    }

    fn get_block_by_index(&self, position: BlockPosition) -> ChainResult<Option<BlockRecord>> {
        self.backend
            .transaction(&self.chain, |txn| -> ChainResult<Option<BlockRecord>> {
                Ok(locate(&*txn, position)?.map(StoredBlock::into_record))
            })
    }

    fn get_block_count(&self) -> ChainResult<u64> {
        self.backend
            .transaction(&self.chain, |txn| -> ChainResult<u64> { Ok(txn.count()?) })
    }

    fn read_range(&self, from: u64, to: u64) -> ChainResult<Vec<BlockRecord>> {
        if from > to {
            return Err(ChainError::InvalidRange { from, to });
        }
        self.backend
            .transaction(&self.chain, |txn| -> ChainResult<Vec<BlockRecord>> {
                Ok(txn
                    .range(from, to)?
                    .into_iter()
                    .map(StoredBlock::into_record)
                    .collect())
            })
    }

    fn read_all(&self) -> ChainResult<Vec<BlockRecord>> {
        self.read_range(0, u64::MAX)
    }
}

impl<B: BlockBackend> std::fmt::Debug for ChainStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStore")
            .field("chain", &self.chain)
            .finish()
    }
}

fn locate(
    txn: &dyn ChainTransaction,
    position: BlockPosition,
) -> BackendResult<Option<StoredBlock>> {
    match position {
        BlockPosition::Tip => txn.tip(),
        BlockPosition::Index(index) => txn.get_by_index(index),
    }
}
