//! Core entity types shared across the CoinVault workspace.
//!
//! - [`Holding`]: the plaintext view of one position
//! - [`Location`] and [`Token`]: the plaintext catalog a holding refers to
//! - [`SyncMetadata`]: per-entity change tracking state
//! - [`PortfolioSnapshot`]: the full exported state used for backup and merge
//!
//! Wire names are camelCase so snapshots stay readable by every client.

mod catalog;
mod holding;
mod metadata;
pub mod presets;
mod snapshot;

pub use catalog::{Location, LocationType, Token};
pub use holding::{
    new_holding_id, now_millis, AggregatedHolding, Holding, HoldingUpdate, LocationQuantity,
    NewHolding,
};
pub use metadata::{
    EntityKind, SyncAction, SyncMetadata, UnsyncedDataCount, UnsyncedDataDetail,
};
pub use snapshot::PortfolioSnapshot;
