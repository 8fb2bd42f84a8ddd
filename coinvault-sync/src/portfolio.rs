use crate::error::SyncResult;
use crate::status::SyncRecord;
use crate::tracker::ChangeTracker;
use coinvault_types::{
    AggregatedHolding, EntityKind, Holding, HoldingUpdate, Location, NewHolding, Token,
};
use coinvault_vault::{Catalog, EncryptedVault};
use std::sync::Arc;
use tracing::debug;

/// Entry point for user edits. Every mutation goes to the vault or catalog
/// and is then recorded with the change tracker.
pub struct PortfolioService {
    vault: Arc<EncryptedVault>,
    catalog: Arc<Catalog>,
    tracker: Arc<ChangeTracker>,
}

impl PortfolioService {
    pub fn new(vault: Arc<EncryptedVault>, catalog: Arc<Catalog>, tracker: Arc<ChangeTracker>) -> Self {
        Self {
            vault,
            catalog,
            tracker,
        }
    }

    fn sync_enabled(&self) -> SyncResult<bool> {
        Ok(SyncRecord::load(self.vault.store().as_ref())?.enabled)
    }

    /// Adds the token row for a symbol the catalog has not seen yet.
    fn track_token(&self, symbol: &str, sync_enabled: bool) -> SyncResult<()> {
        if let Some(token) = self.catalog.ensure_token_exists(symbol)? {
            self.tracker
                .record_created(EntityKind::Token, &token.symbol, sync_enabled)?;
        }
        Ok(())
    }

    pub fn holdings(&self) -> SyncResult<Vec<Holding>> {
        Ok(self.vault.get_holdings()?)
    }

    pub fn aggregated_holdings(&self) -> SyncResult<Vec<AggregatedHolding>> {
        Ok(self.vault.aggregated_holdings()?)
    }

    pub fn locations(&self) -> SyncResult<Vec<Location>> {
        Ok(self.catalog.locations()?)
    }

    pub fn tokens(&self) -> SyncResult<Vec<Token>> {
        Ok(self.catalog.tokens()?)
    }

    pub fn add_holding(&self, input: NewHolding) -> SyncResult<Holding> {
        let enabled = self.sync_enabled()?;
        let holding = self.vault.add_holding(input)?;
        self.track_token(&holding.symbol, enabled)?;
        self.tracker
            .record_created(EntityKind::Holding, &holding.id, enabled)?;
        Ok(holding)
    }

    pub fn update_holding(&self, id: &str, update: &HoldingUpdate) -> SyncResult<Holding> {
        let enabled = self.sync_enabled()?;
        let holding = self.vault.update_holding(id, update)?;
        if update.symbol.is_some() {
            self.track_token(&holding.symbol, enabled)?;
        }
        self.tracker
            .record_modified(EntityKind::Holding, &holding.id, enabled)?;
        Ok(holding)
    }

    /// Returns whether the holding existed.
    pub fn delete_holding(&self, id: &str) -> SyncResult<bool> {
        let enabled = self.sync_enabled()?;
        let Some(holding) = self.vault.get_holding(id)? else {
            return Ok(false);
        };
        let removed = self.vault.delete_holding(id)?;
        if removed {
            self.tracker
                .record_deleted(EntityKind::Holding, id, &holding.symbol, enabled)?;
            debug!("deleted holding {id}");
        }
        Ok(removed)
    }

    pub fn add_custom_location(&self, name: &str) -> SyncResult<Location> {
        let enabled = self.sync_enabled()?;
        let location = self.catalog.add_custom_location(name)?;
        self.tracker
            .record_created(EntityKind::Location, &location.id, enabled)?;
        Ok(location)
    }
}
