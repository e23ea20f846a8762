//! Hash-chained block store for the UCN ledger.
//!
//! This crate is the heart of UCN. It provides:
//! - [`ChainStore`], which appends, looks up, and rolls back blocks on one
//!   named chain while enforcing genesis uniqueness, previous-hash linkage,
//!   and contiguous indexing
//! - `BlockReader` / `BlockWriter` trait boundaries
//! - [`ChainValidator`], a full audit of a chain's invariants

pub mod error;
pub mod store;
pub mod traits;
pub mod validation;

pub use error::{ChainError, ChainResult};
pub use store::ChainStore;
pub use traits::{BlockReader, BlockWriter};
pub use validation::{ChainValidator, ValidationReport, Violation, ViolationKind};
