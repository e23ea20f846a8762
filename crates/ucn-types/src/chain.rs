//! Chain name validation.
//!
//! A chain name partitions one backend into independent ledgers. Names end
//! up as file names in on-disk backends, so the accepted alphabet is narrow:
//! - Must be non-empty and at most [`ChainName::MAX_LEN`] bytes
//! - Only ASCII alphanumerics, `-`, `_` and `.`
//! - Must not start with `.`
//! - Must not contain `..`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Validated name of an independent chain.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ChainName(String);

impl ChainName {
    /// Name used when the caller does not pick one.
    pub const DEFAULT: &'static str = "blocks";

    /// Longest accepted name, in bytes.
    pub const MAX_LEN: usize = 128;

    /// Validate and wrap a chain name.
    ///
    /// # Examples
    ///
    /// ```
    /// use ucn_types::ChainName;
    ///
    /// assert!(ChainName::new("blocks").is_ok());
    /// assert!(ChainName::new("bills-2024.v1").is_ok());
    /// assert!(ChainName::new("").is_err());
    /// assert!(ChainName::new("../etc").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_chain_name(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChainName {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Debug for ChainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainName({})", self.0)
    }
}

impl fmt::Display for ChainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ChainName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ChainName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChainName> for String {
    fn from(name: ChainName) -> Self {
        name.0
    }
}

fn validate_chain_name(name: &str) -> Result<(), TypeError> {
    let invalid = |reason: String| TypeError::InvalidChainName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("chain name must not be empty".into()));
    }
    if name.len() > ChainName::MAX_LEN {
        return Err(invalid(format!(
            "longer than {} bytes",
            ChainName::MAX_LEN
        )));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(format!("contains forbidden character: {ch:?}")));
    }
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'".into()));
    }
    if name.contains("..") {
        return Err(invalid("must not contain '..'".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_blocks() {
        assert_eq!(ChainName::default().as_str(), "blocks");
    }

    #[test]
    fn valid_names() {
        for name in ["blocks", "accounts", "bills_v2", "a.b-c", "X9"] {
            assert!(ChainName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn invalid_names() {
        let too_long = "a".repeat(ChainName::MAX_LEN + 1);
        for name in [
            "",
            ".hidden",
            "a..b",
            "with space",
            "slash/name",
            "back\\slash",
            "colon:",
            too_long.as_str(),
        ] {
            assert!(ChainName::new(name).is_err(), "{name:?} should be invalid");
        }
    }

    #[test]
    fn max_len_is_accepted() {
        assert!(ChainName::new("a".repeat(ChainName::MAX_LEN)).is_ok());
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: ChainName = serde_json::from_str("\"ledger\"").unwrap();
        assert_eq!(ok.as_str(), "ledger");
        assert!(serde_json::from_str::<ChainName>("\"../x\"").is_err());
    }
}
