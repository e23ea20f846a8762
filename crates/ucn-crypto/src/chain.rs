use std::collections::HashSet;

use ucn_types::StoredBlock;

use crate::hasher::ContentHasher;

/// Hash chain integrity verifier.
///
/// Verifies that a sequence of stored blocks, ordered by position, forms a
/// valid chain: indices run `0..N-1`, the genesis block has an empty
/// previous hash, each later block links to its predecessor's hash, every
/// stored hash matches its record, and no hash repeats.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verify a chain of blocks, stopping at the first problem.
    pub fn verify_chain(blocks: &[StoredBlock]) -> Result<(), ChainVerifyError> {
        let mut seen = HashSet::with_capacity(blocks.len());

        for (position, block) in blocks.iter().enumerate() {
            let expected = position as u64;
            if block.index() != expected {
                return Err(ChainVerifyError::IndexGap {
                    expected,
                    found: block.index(),
                });
            }

            if !ContentHasher::verify(&block.record, &block.hash) {
                return Err(ChainVerifyError::HashMismatch { index: expected });
            }

            if position == 0 {
                if !block.record.previous_hash.is_empty() {
                    return Err(ChainVerifyError::GenesisHasPreviousHash);
                }
            } else {
                let previous = blocks[position - 1].hash.to_string();
                if block.record.previous_hash != previous {
                    return Err(ChainVerifyError::BrokenLink { index: expected });
                }
            }

            if !seen.insert(block.hash) {
                return Err(ChainVerifyError::DuplicateHash { index: expected });
            }
        }

        Ok(())
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainVerifyError {
    #[error("genesis block has a previous hash (should be empty)")]
    GenesisHasPreviousHash,

    #[error("index gap: expected block #{expected}, found #{found}")]
    IndexGap { expected: u64, found: u64 },

    #[error("broken link at #{index}: previous_hash does not match")]
    BrokenLink { index: u64 },

    #[error("hash mismatch at #{index}: computed hash differs from stored")]
    HashMismatch { index: u64 },

    #[error("duplicate hash at #{index}")]
    DuplicateHash { index: u64 },
}
