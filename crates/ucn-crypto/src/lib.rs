//! Content addressing for the UCN ledger.
//!
//! Provides the canonical block encoding used as hash pre-image, SHA-256
//! content addresses, and hash chain verification.
//!
//! All hashing wraps the `sha2` crate; there is no custom cryptography.

pub mod chain;
pub mod codec;
pub mod hasher;

pub use chain::{ChainVerifyError, HashChainVerifier};
pub use codec::{CanonicalCodec, CanonicalFields, CodecError};
pub use hasher::{ContentAddressed, ContentHasher};
