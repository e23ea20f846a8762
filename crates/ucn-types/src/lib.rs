//! Foundation types for the UCN ledger.
//!
//! This crate provides the value types shared by every other UCN crate.
//!
//! # Key Types
//!
//! - [`BlockRecord`] -- A block as held in a chain: protocol tag, opaque payload,
//!   previous-block link, and position
//! - [`BlockHash`] -- Content address of a block (`sha256:<hex>`)
//! - [`StoredBlock`] -- A record together with its derived hash, as persisted
//! - [`BlockPosition`] -- Index selector with a tip alias
//! - [`ChainName`] -- Validated partition key naming an independent chain

pub mod block;
pub mod chain;
pub mod error;
pub mod hash;

pub use block::{BlockPosition, BlockRecord, StoredBlock};
pub use chain::ChainName;
pub use error::TypeError;
pub use hash::{BlockHash, HASH_PREFIX};
