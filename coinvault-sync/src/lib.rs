//! Change tracking and remote sync for CoinVault.
//!
//! The [`ChangeTracker`] records which holdings, locations and tokens changed
//! since the last reconciled snapshot. The [`SyncCoordinator`] compares the
//! local portfolio with the encrypted remote backup, pushes or applies
//! changes, and surfaces conflicts it cannot settle safely.
//! [`PortfolioService`] is the mutation entry point that keeps both in step.

mod coordinator;
mod error;
pub mod metadata;
mod portfolio;
pub mod snapshot;
mod status;
mod tracker;

pub use coordinator::SyncCoordinator;
pub use error::{ErrorKind, SyncError, SyncResult};
pub use portfolio::PortfolioService;
pub use status::{
    ConflictChoice, SyncConflict, SyncEvent, SyncFailure, SyncOutcome, SyncRecord, SyncState,
    SyncStatus, SyncSuccess,
};
pub use tracker::{ChangeTracker, COUNT_CACHE_TTL};
