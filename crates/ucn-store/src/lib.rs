//! Block storage backends for the UCN ledger.
//!
//! The chain store never touches persistence directly. It runs every
//! operation inside a [`BlockBackend::transaction`] scoped to one chain name
//! and talks to the chain through the [`ChainTransaction`] primitives: tip
//! query, point lookups, contiguous insert, and suffix deletion.
//!
//! # Backends
//!
//! - [`InMemoryBackend`] -- `HashMap`-based backend for tests and embedding
//! - [`FileBackend`] -- one append-only, CRC-framed log per chain
//! - [`AnyBackend`] -- either of the above, selected by [`BackendConfig`]
//!
//! # Design Rules
//!
//! 1. A transaction either commits every change it made or none of them.
//! 2. Transactions on one chain are serialized; distinct chains never contend.
//! 3. Block hashes are unique within a chain and indices stay contiguous;
//!    `insert` rejects anything else.
//! 4. The backend never interprets block payloads.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod config;
pub mod error;
pub mod file;
pub mod log;
pub mod memory;
pub mod partition;
pub mod traits;

pub use config::{AnyBackend, BackendConfig, BackendKind, SyncMode};
pub use error::{BackendError, BackendResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use partition::LogOp;
pub use traits::{BlockBackend, ChainTransaction};
