use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Prefix carried by every rendered content address.
pub const HASH_PREFIX: &str = "sha256:";

/// Content address of a block.
///
/// A `BlockHash` is the SHA-256 digest of a block's canonical encoding. It
/// renders as `sha256:` followed by 64 lowercase hex characters, which is
/// also the value the next block stores as its `previous_hash`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// Create a `BlockHash` from a pre-computed digest.
    pub const fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded digest without the `sha256:` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse a rendered content address.
    ///
    /// Only the canonical form is accepted: the `sha256:` prefix followed by
    /// exactly 64 lowercase hex characters.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let digest = s
            .strip_prefix(HASH_PREFIX)
            .ok_or_else(|| TypeError::MissingPrefix(s.to_string()))?;
        if digest.len() != 64 {
            return Err(TypeError::InvalidLength {
                expected: 64,
                actual: digest.len(),
            });
        }
        if !digest
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(TypeError::InvalidHex(digest.to_string()));
        }
        let bytes = hex::decode(digest).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.short_hex())
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{HASH_PREFIX}{}", self.to_hex())
    }
}

impl FromStr for BlockHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BlockHash {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BlockHash> for String {
    fn from(hash: BlockHash) -> Self {
        hash.to_string()
    }
}

impl From<[u8; 32]> for BlockHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl PartialEq<str> for BlockHash {
    fn eq(&self, other: &str) -> bool {
        Self::parse(other).is_ok_and(|parsed| parsed == *self)
    }
}
