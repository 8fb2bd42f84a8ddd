//! Local table storage for CoinVault.
//!
//! A small keyed-table abstraction the vault and change tracker persist
//! through. Values are JSON strings; keys are ordered strings so range
//! queries are cheap.
//!
//! # Backends
//!
//! - [`MemoryTableStore`]: process-lifetime storage, used by tests and ephemeral sessions
//! - [`SqliteTableStore`]: a single SQLite file holding every table
//!
//! Bulk clear/replace goes through [`WriteBatch`], applied atomically.

mod error;
mod memory;
mod sqlite;
mod store;
pub mod tables;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryTableStore;
pub use sqlite::SqliteTableStore;
pub use store::{KeyRange, TableStore, TableStoreExt, WriteBatch, WriteOp};
