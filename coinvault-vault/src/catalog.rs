use crate::error::{VaultError, VaultResult};
use crate::settings::record_data_modified;
use coinvault_storage::{tables, TableStore, TableStoreExt, WriteBatch};
use coinvault_types::presets::{preset_locations, preset_tokens};
use coinvault_types::{now_millis, Location, Token};
use std::sync::Arc;
use tracing::debug;

/// Plaintext locations and tokens.
pub struct Catalog {
    store: Arc<dyn TableStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    /// Seeds any missing preset locations and tokens.
    ///
    /// Returns how many rows were added.
    pub fn ensure_initial_data(&self) -> VaultResult<usize> {
        let mut batch = WriteBatch::new();
        for location in preset_locations() {
            if self.store.get(tables::LOCATIONS, &location.id)?.is_none() {
                batch.put_json(tables::LOCATIONS, &location.id, &location)?;
            }
        }
        for token in preset_tokens() {
            if self.store.get(tables::TOKENS, &token.symbol)?.is_none() {
                batch.put_json(tables::TOKENS, &token.symbol, &token)?;
            }
        }
        let added = batch.len();
        if added > 0 {
            self.store.commit(batch)?;
            debug!("seeded {added} preset catalog rows");
        }
        Ok(added)
    }

    pub fn locations(&self) -> VaultResult<Vec<Location>> {
        Ok(self.store.scan_json(tables::LOCATIONS)?)
    }

    pub fn location(&self, id: &str) -> VaultResult<Option<Location>> {
        Ok(self.store.get_json(tables::LOCATIONS, id)?)
    }

    pub fn add_custom_location(&self, name: &str) -> VaultResult<Location> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::InvalidHolding("location name is empty".to_string()));
        }
        let location = Location::custom(name);
        self.store.put_json(tables::LOCATIONS, &location.id, &location)?;
        record_data_modified(self.store.as_ref(), now_millis())?;
        Ok(location)
    }

    pub fn tokens(&self) -> VaultResult<Vec<Token>> {
        Ok(self.store.scan_json(tables::TOKENS)?)
    }

    pub fn token(&self, symbol: &str) -> VaultResult<Option<Token>> {
        Ok(self
            .store
            .get_json(tables::TOKENS, &symbol.trim().to_uppercase())?)
    }

    /// Creates a token row for `symbol` if none exists.
    ///
    /// Returns the new token, or `None` if it was already known.
    pub fn ensure_token_exists(&self, symbol: &str) -> VaultResult<Option<Token>> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() || self.token(&symbol)?.is_some() {
            return Ok(None);
        }
        let token = Token::new(symbol.to_lowercase(), symbol.clone(), symbol.clone());
        self.store.put_json(tables::TOKENS, &symbol, &token)?;
        record_data_modified(self.store.as_ref(), now_millis())?;
        debug!("added token {symbol}");
        Ok(Some(token))
    }

    /// Atomically replaces both tables, then re-seeds presets.
    pub fn replace_catalog(&self, locations: &[Location], tokens: &[Token]) -> VaultResult<()> {
        let mut batch = WriteBatch::new();
        batch.clear(tables::LOCATIONS).clear(tables::TOKENS);
        for location in locations {
            batch.put_json(tables::LOCATIONS, &location.id, location)?;
        }
        for token in tokens {
            let key = token.symbol.trim().to_uppercase();
            batch.put_json(tables::TOKENS, &key, token)?;
        }
        self.store.commit(batch)?;
        self.ensure_initial_data()?;
        Ok(())
    }
}
