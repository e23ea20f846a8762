use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use ucn_types::ChainName;

use crate::error::{BackendError, BackendResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use crate::traits::{BlockBackend, ChainTransaction};

/// Flush/sync strategy for durable backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every committed transaction.
    #[default]
    EveryWrite,
    /// Rely on OS page-cache buffering (fastest, least durable).
    OsDefault,
}

/// Which backend adapter to open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Volatile, process-local storage.
    Memory,
    /// Chain logs under `data_dir`.
    #[default]
    File,
}

/// Backend selection and settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub data_dir: PathBuf,
    pub sync: SyncMode,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            data_dir: PathBuf::from(".ucn"),
            sync: SyncMode::default(),
        }
    }
}

/// A backend chosen at runtime from a [`BackendConfig`].
#[derive(Debug)]
pub enum AnyBackend {
    Memory(InMemoryBackend),
    File(FileBackend),
}

impl AnyBackend {
    /// Open the backend described by `config`.
    pub fn open(config: &BackendConfig) -> BackendResult<Self> {
        match config.kind {
            BackendKind::Memory => Ok(Self::Memory(InMemoryBackend::new())),
            BackendKind::File => Ok(Self::File(FileBackend::open(
                &config.data_dir,
                config.sync,
            )?)),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Memory(_) => BackendKind::Memory,
            Self::File(_) => BackendKind::File,
        }
    }

    /// Compact a chain's durable log. Returns `None` for backends without one.
    pub fn compact(&self, chain: &ChainName) -> BackendResult<Option<u64>> {
        match self {
            Self::Memory(_) => Ok(None),
            Self::File(backend) => backend.compact(chain).map(Some),
        }
    }
}

impl BlockBackend for AnyBackend {
    fn transaction<T, E, F>(&self, chain: &ChainName, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ChainTransaction) -> Result<T, E>,
        E: From<BackendError>,
    {
        match self {
            Self::Memory(backend) => backend.transaction(chain, work),
            Self::File(backend) => backend.transaction(chain, work),
        }
    }

    fn chains(&self) -> BackendResult<Vec<ChainName>> {
        match self {
            Self::Memory(backend) => backend.chains(),
            Self::File(backend) => backend.chains(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = BackendConfig::default();
        assert_eq!(config.kind, BackendKind::File);
        assert_eq!(config.data_dir, PathBuf::from(".ucn"));
        assert_eq!(config.sync, SyncMode::EveryWrite);
    }

    #[test]
    fn opens_memory_backend() {
        let config = BackendConfig {
            kind: BackendKind::Memory,
            ..BackendConfig::default()
        };
        let backend = AnyBackend::open(&config).unwrap();
        assert_eq!(backend.kind(), BackendKind::Memory);
        assert_eq!(backend.compact(&ChainName::default()).unwrap(), None);
    }

    #[test]
    fn opens_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackendConfig {
            kind: BackendKind::File,
            data_dir: dir.path().join("ledger"),
            sync: SyncMode::OsDefault,
        };
        let backend = AnyBackend::open(&config).unwrap();
        assert_eq!(backend.kind(), BackendKind::File);
        assert!(dir.path().join("ledger").is_dir());
        assert_eq!(backend.compact(&ChainName::default()).unwrap(), Some(0));
    }
}
