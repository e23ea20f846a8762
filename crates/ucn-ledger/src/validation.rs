use std::collections::HashSet;
use std::sync::Arc;

use ucn_crypto::ContentHasher;
use ucn_store::BlockBackend;
use ucn_types::{BlockHash, ChainName};

use crate::error::ChainResult;
use crate::store::ChainStore;
use crate::traits::BlockReader;

/// Result of a chain audit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub chain: ChainName,
    pub block_count: u64,
    /// Hash of the highest block, recomputed from its content.
    pub tip: Option<BlockHash>,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific integrity violation detected during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Position of the offending block in ascending order.
    pub position: u64,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    MissingGenesis,
    GenesisHasPreviousHash,
    IndexGap,
    BrokenLink,
    DuplicateHash,
}

/// Chain integrity validator.
pub struct ChainValidator;

impl ChainValidator {
    /// Validate a single chain for all invariants.
    pub fn validate<R: BlockReader + ?Sized>(reader: &R) -> ChainResult<ValidationReport> {
        let blocks = reader.read_all()?;
        let mut violations = Vec::new();
        let mut seen = HashSet::with_capacity(blocks.len());
        let mut previous: Option<BlockHash> = None;

        if let Some(first) = blocks.first() {
            if first.index != 0 {
                violations.push(Violation {
                    position: 0,
                    kind: ViolationKind::MissingGenesis,
                    description: format!("lowest block has index {}", first.index),
                });
            }
        }

        for (position, block) in blocks.iter().enumerate() {
            let position = position as u64;
            let hash = ContentHasher::block_hash(block);

            if block.index != position {
                violations.push(Violation {
                    position,
                    kind: ViolationKind::IndexGap,
                    description: format!("expected index {position}, got {}", block.index),
                });
            }

            match &previous {
                None if !block.previous_hash.is_empty() => violations.push(Violation {
                    position,
                    kind: ViolationKind::GenesisHasPreviousHash,
                    description: format!("genesis links to {:?}", block.previous_hash),
                }),
                Some(expected) if block.previous_hash != expected.to_string() => {
                    violations.push(Violation {
                        position,
                        kind: ViolationKind::BrokenLink,
                        description: format!(
                            "previous hash {:?} does not match {expected}",
                            block.previous_hash
                        ),
                    })
                }
                _ => {}
            }

            if !seen.insert(hash) {
                violations.push(Violation {
                    position,
                    kind: ViolationKind::DuplicateHash,
                    description: format!("{hash} already appears lower in the chain"),
                });
            }
            previous = Some(hash);
        }

        Ok(ValidationReport {
            chain: reader.chain().clone(),
            block_count: blocks.len() as u64,
            tip: previous,
            violations,
        })
    }

    /// Validate every non-empty chain held by `backend`.
    pub fn validate_all<B: BlockBackend>(backend: &Arc<B>) -> ChainResult<Vec<ValidationReport>> {
        let mut reports = Vec::new();
        for chain in backend.chains()? {
            let store = ChainStore::open(Arc::clone(backend), chain);
            reports.push(Self::validate(&store)?);
        }
        Ok(reports)
    }
}
