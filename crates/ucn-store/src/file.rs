use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};
use ucn_crypto::HashChainVerifier;
use ucn_types::ChainName;

use crate::config::SyncMode;
use crate::error::{BackendError, BackendResult};
use crate::log::{ChainLog, LOG_EXTENSION};
use crate::partition::{ChainPartition, LogOp, PartitionTxn};
use crate::traits::{BlockBackend, ChainTransaction};

struct FileChain {
    partition: ChainPartition,
    log: ChainLog,
}

type Slot = Arc<Mutex<FileChain>>;

/// Durable backend keeping one append-only log per chain.
///
/// Chain `name` lives in `<root>/<name>.chain`. On open every log is
/// replayed into memory, re-hashed, and verified as a chain; reads are then
/// served from memory and each committed transaction appends one frame.
pub struct FileBackend {
    root: PathBuf,
    sync: SyncMode,
    chains: RwLock<HashMap<ChainName, Slot>>,
}

impl FileBackend {
    /// Open (or create) a backend rooted at `root`, replaying every chain
    /// log found there.
    pub fn open(root: impl AsRef<Path>, sync: SyncMode) -> BackendResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let mut chains = HashMap::new();
        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let name = match ChainName::new(stem) {
                Ok(name) => name,
                Err(err) => {
                    warn!(path = ?path, error = %err, "skipping log with invalid chain name");
                    continue;
                }
            };
            let chain = Self::load_chain(&path, sync)?;
            chains.insert(name, Arc::new(Mutex::new(chain)));
        }

        info!(root = ?root, chains = chains.len(), "file backend opened");
        Ok(Self {
            root,
            sync,
            chains: RwLock::new(chains),
        })
    }

    /// Directory holding the chain logs.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rewrite a chain's log as a single frame of its live blocks.
    ///
    /// Rollbacks leave both the removed inserts and the truncation in the
    /// log; compaction drops them. Returns the number of blocks written.
    pub fn compact(&self, chain: &ChainName) -> BackendResult<u64> {
        let slot = self.slot(chain)?;
        let (blocks, vacant) = {
            let mut guard = slot
                .lock()
                .map_err(|_| BackendError::LockPoisoned("chain log"))?;
            let FileChain { partition, log } = &mut *guard;

            let ops: Vec<LogOp> = partition
                .blocks()
                .iter()
                .cloned()
                .map(LogOp::Insert)
                .collect();
            log.rewrite(&ops)?;
            (partition.len(), guard.is_vacant())
        };

        info!(chain = %chain, blocks, "chain log compacted");
        if vacant {
            self.prune(chain, slot)?;
        }
        Ok(blocks)
    }

    fn load_chain(path: &Path, sync: SyncMode) -> BackendResult<FileChain> {
        let (log, frames) = ChainLog::recover(path, sync)?;
        let mut partition = ChainPartition::default();
        for (offset, ops) in frames {
            for op in ops {
                partition.apply(op).map_err(|err| BackendError::CorruptLog {
                    path: path.to_path_buf(),
                    offset,
                    reason: err.to_string(),
                })?;
            }
        }

        HashChainVerifier::verify_chain(partition.blocks()).map_err(|err| {
            BackendError::CorruptLog {
                path: path.to_path_buf(),
                offset: 0,
                reason: err.to_string(),
            }
        })?;

        debug!(path = ?path, blocks = partition.len(), "chain log replayed");
        Ok(FileChain { partition, log })
    }

    /// Run `work`, then persist its journal as one frame before committing.
    fn run<T, E, F>(chain: &ChainName, file_chain: &mut FileChain, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ChainTransaction) -> Result<T, E>,
        E: From<BackendError>,
    {
        let FileChain { partition, log } = file_chain;
        let mut txn = PartitionTxn::begin(partition);
        let value = match work(&mut txn) {
            Ok(value) => value,
            Err(err) => {
                debug!(
                    chain = %chain,
                    changes = txn.journal().len(),
                    "rolling back transaction"
                );
                txn.rollback();
                return Err(err);
            }
        };

        if !txn.journal().is_empty() {
            if let Err(err) = log.append(txn.journal()) {
                warn!(
                    chain = %chain,
                    path = ?log.path(),
                    error = %err,
                    "commit failed; rolling back"
                );
                txn.rollback();
                return Err(err.into());
            }
        }
        txn.commit();
        Ok(value)
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
        let slot = map.entry(chain.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(FileChain {
                partition: ChainPartition::default(),
                log: ChainLog::empty(ChainLog::path_for(&self.root, chain), self.sync),
            }))
        });
        Ok(Arc::clone(slot))
    }

    /// Forget `chain` if it has neither blocks nor a log on disk and no
    /// other transaction is using it.
    fn prune(&self, chain: &ChainName, slot: Slot) -> BackendResult<()> {
        let mut map = self
            .chains
            .write()
            .map_err(|_| BackendError::LockPoisoned("chain map"))?;
        // One reference in the map, one here: nobody else can reach it.
        let unshared = map.get(chain).is_some_and(|s| Arc::ptr_eq(s, &slot))
            && Arc::strong_count(&slot) == 2;
        if unshared {
            let guard = slot
                .lock()
                .map_err(|_| BackendError::LockPoisoned("chain log"))?;
            if guard.is_vacant() {
                drop(guard);
                map.remove(chain);
            }
        }
        Ok(())
    }
}

impl FileChain {
    fn is_vacant(&self) -> bool {
        self.partition.is_empty() && self.log.len() == 0
    }
}

impl BlockBackend for FileBackend {
    fn transaction<T, E, F>(&self, chain: &ChainName, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ChainTransaction) -> Result<T, E>,
        E: From<BackendError>,
    {
        let slot = self.slot(chain)?;
        let (result, vacant) = {
            let mut guard = slot
                .lock()
                .map_err(|_| BackendError::LockPoisoned("chain log"))?;
            let result = Self::run(chain, &mut guard, work);
            (result, guard.is_vacant())
        };

        if vacant {
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
            let chain = slot
                .lock()
                .map_err(|_| BackendError::LockPoisoned("chain log"))?;
            if !chain.partition.is_empty() {
                names.push(name.clone());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("root", &self.root)
            .field("sync", &self.sync)
            .finish()
    }
}
