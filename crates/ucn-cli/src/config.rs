use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use ucn_store::{BackendConfig, BackendKind};
use ucn_types::ChainName;

use crate::cli::{BackendArg, Cli};

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "ucn.toml";

/// Settings read from `ucn.toml`, overridable from the command line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub chain: ChainName,
    pub log_level: String,
    pub store: BackendConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            chain: ChainName::default(),
            log_level: "info".into(),
            store: BackendConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load the configuration file (explicit path, else `./ucn.toml` if it
    /// exists, else defaults) and apply command-line overrides.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(cli)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_overrides(&mut self, cli: &Cli) -> anyhow::Result<()> {
        if let Some(chain) = &cli.chain {
            self.chain = ChainName::new(chain.as_str())
                .with_context(|| format!("invalid --chain {chain:?}"))?;
        }
        if let Some(dir) = &cli.data_dir {
            self.store.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = cli.backend {
            self.store.kind = match backend {
                BackendArg::Memory => BackendKind::Memory,
                BackendArg::File => BackendKind::File,
            };
        }
        Ok(())
    }
}
