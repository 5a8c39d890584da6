//! Store layer for kvmodel.
//!
//! The engine treats the key-value store as a black box offering hashes,
//! sets, sorted sets, counters, pub/sub channels and all-or-nothing batches.
//!
//! # Architecture
//!
//! - [`Store`] is the async trait every backend implements
//! - [`Batch`] collects the mutations of one save or remove; [`BatchReport`]
//!   reports per-operation outcomes instead of a single success flag
//! - [`KeySpace`] owns the namespaced key layout shared by all deployments
//!   of one prefix
//! - [`MemoryStore`] is a complete in-process backend

mod batch;
mod error;
mod keys;
mod memory;
mod store;

pub use batch::{Batch, BatchReport, Op, OpOutcome};
pub use error::{StoreError, StoreResult};
pub use keys::KeySpace;
pub use memory::MemoryStore;
pub use store::{ScoreRange, Store};

/// Default key namespace.
pub const DEFAULT_PREFIX: &str = "kvmodel";
