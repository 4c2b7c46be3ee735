//! Storage layer for the Veil access control engine.
//!
//! Persistence for the policy store, request ledger, and grant ledger
//! behind the async [`Store`] trait. Two implementations:
//!
//! - [`SqliteStore`]: durable, file-backed or in-memory SQLite.
//! - [`MemoryStore`]: pure in-memory, for tests and embedded use.
//!
//! The trait concentrates every concurrency-sensitive step — uniqueness
//! on insert, terminal transitions, view consumption — into single atomic
//! store calls, so backends enforce the ledger invariants and the engine
//! above stays race-free without its own locking.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    ConsumeResult, InsertGrantResult, InsertRequestResult, Store, TerminateResult,
};
