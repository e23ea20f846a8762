use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;
use ucn_types::ChainName;

use crate::error::{BackendError, BackendResult};
use crate::partition::{ChainPartition, PartitionTxn};
use crate::traits::{BlockBackend, ChainTransaction};

type Slot = Arc<Mutex<ChainPartition>>;

/// In-memory, HashMap-based block backend.
///
/// Intended for tests and embedding. Each chain lives behind its own
/// `Mutex`, so transactions on one chain are serialized while different
/// chains proceed in parallel. Data is lost when the backend is dropped.
pub struct InMemoryBackend {
    chains: RwLock<HashMap<ChainName, Slot>>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            chains: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, chain: &ChainName) -> BackendResult<Slot> {
        {
            let map = self
                .chains
                .read()
                .map_err(|_| BackendError::LockPoisoned("chain map"))?;
            if let Some(slot) = map.get(chain) {
                return Ok(Arc::clone(slot));
            }
        }
        let mut map = self
            .chains
            .write()
            .map_err(|_| BackendError::LockPoisoned("chain map"))?;
        Ok(Arc::clone(map.entry(chain.clone()).or_default()))
    }

    /// Forget `chain` if it holds no blocks and no other transaction is
    /// using it, so lookups on unknown names leave nothing behind.
    fn prune(&self, chain: &ChainName, slot: Slot) -> BackendResult<()> {
        let mut map = self
            .chains
            .write()
            .map_err(|_| BackendError::LockPoisoned("chain map"))?;
        // One reference in the map, one here: nobody else can reach it.
        let unshared = map.get(chain).is_some_and(|s| Arc::ptr_eq(s, &slot))
            && Arc::strong_count(&slot) == 2;
        if unshared {
            let empty = slot
                .lock()
                .map_err(|_| BackendError::LockPoisoned("chain partition"))?
                .is_empty();
            if empty {
                map.remove(chain);
            }
        }
        Ok(())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockBackend for InMemoryBackend {
    fn transaction<T, E, F>(&self, chain: &ChainName, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ChainTransaction) -> Result<T, E>,
        E: From<BackendError>,
    {
        let slot = self.slot(chain)?;
        let (result, empty) = {
            let mut partition = slot
                .lock()
                .map_err(|_| BackendError::LockPoisoned("chain partition"))?;

            let mut txn = PartitionTxn::begin(&mut partition);
            let result = match work(&mut txn) {
                Ok(value) => {
                    txn.commit();
                    Ok(value)
                }
                Err(err) => {
                    debug!(
                        chain = %chain,
                        changes = txn.journal().len(),
                        "rolling back transaction"
                    );
                    txn.rollback();
                    Err(err)
                }
            };
            (result, partition.is_empty())
        };

        if empty {
            self.prune(chain, slot)?;
        }
        result
    }

    fn chains(&self) -> BackendResult<Vec<ChainName>> {
        let map = self
            .chains
            .read()
            .map_err(|_| BackendError::LockPoisoned("chain map"))?;
        let mut names = Vec::new();
        for (name, slot) in map.iter() {
            let partition = slot
                .lock()
                .map_err(|_| BackendError::LockPoisoned("chain partition"))?;
            if !partition.is_empty() {
                names.push(name.clone());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.chains.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("InMemoryBackend")
            .field("chain_count", &count)
            .finish()
    }
}
