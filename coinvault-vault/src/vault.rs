use crate::error::{VaultError, VaultResult};
use crate::key_cache::KeyCache;
use crate::settings::record_data_modified;
use coinvault_crypto::{decrypt_string, encrypt_string, DerivedKey, EncryptedPayload};
use coinvault_storage::{tables, TableStore, TableStoreExt, WriteBatch};
use coinvault_types::{
    now_millis, AggregatedHolding, Holding, HoldingUpdate, LocationQuantity, NewHolding,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

// ============================================================================
// Stored representation
// ============================================================================

/// A holding as persisted: identity in clear, sensitive fields encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedHolding {
    pub id: String,
    pub symbol: String,
    pub encrypted_quantity: EncryptedPayload,
    pub encrypted_location_id: EncryptedPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_note: Option<EncryptedPayload>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EncryptedHolding {
    fn seal(holding: &Holding, key: &DerivedKey) -> VaultResult<Self> {
        Ok(Self {
            id: holding.id.clone(),
            symbol: holding.symbol.clone(),
            encrypted_quantity: encrypt_string(key, &holding.quantity.to_string())?,
            encrypted_location_id: encrypt_string(key, &holding.location_id)?,
            encrypted_note: holding
                .note
                .as_deref()
                .map(|note| encrypt_string(key, note))
                .transpose()?,
            created_at: holding.created_at,
            updated_at: holding.updated_at,
        })
    }

    fn open(&self, key: &DerivedKey) -> VaultResult<Holding> {
        let field = |payload: &EncryptedPayload| {
            decrypt_string(key, payload).map_err(|_| VaultError::KeyMismatch(self.id.clone()))
        };
        let quantity = field(&self.encrypted_quantity)?;
        let quantity: f64 = quantity.parse().map_err(|_| {
            VaultError::InvalidHolding(format!("holding {} has a non-numeric quantity", self.id))
        })?;
        Ok(Holding {
            id: self.id.clone(),
            symbol: self.symbol.clone(),
            quantity,
            location_id: field(&self.encrypted_location_id)?,
            note: self.encrypted_note.as_ref().map(field).transpose()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Rows written before field encryption existed are plain holdings.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredHolding {
    Encrypted(EncryptedHolding),
    Legacy(Holding),
}

// ============================================================================
// EncryptedVault
// ============================================================================

/// Field-level encrypted CRUD over holdings.
///
/// Writes are not serialized per entity; concurrent updates to the same
/// holding race with last-write-wins at the storage layer.
pub struct EncryptedVault {
    store: Arc<dyn TableStore>,
    key: RwLock<Option<DerivedKey>>,
    key_cache: Arc<dyn KeyCache>,
}

impl EncryptedVault {
    pub fn new(store: Arc<dyn TableStore>, key_cache: Arc<dyn KeyCache>) -> Self {
        Self {
            store,
            key: RwLock::new(None),
            key_cache,
        }
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    pub fn key_cache(&self) -> &Arc<dyn KeyCache> {
        &self.key_cache
    }

    // ── Key lifecycle ──────────────────────────────────────────

    /// Installs the active key. Does not touch the key cache.
    pub fn set_key(&self, key: DerivedKey) {
        if let Ok(mut guard) = self.key.write() {
            *guard = Some(key);
        }
    }

    /// Drops the in-memory key and the cached copy. Stored rows are untouched.
    pub fn lock(&self) {
        if let Ok(mut guard) = self.key.write() {
            *guard = None;
        }
        self.key_cache.clear();
        debug!("vault locked");
    }

    pub fn is_unlocked(&self) -> bool {
        self.key.read().map(|guard| guard.is_some()).unwrap_or(false)
    }

    /// Restores the key from the key cache if the vault is locked.
    ///
    /// Returns whether the vault is unlocked afterwards.
    pub fn try_auto_unlock(&self) -> bool {
        if self.is_unlocked() {
            return true;
        }
        match self.key_cache.load() {
            Some(key) => {
                self.set_key(key);
                debug!("vault auto-unlocked from key cache");
                true
            }
            None => false,
        }
    }

    fn with_key<T>(&self, f: impl FnOnce(&DerivedKey) -> VaultResult<T>) -> VaultResult<T> {
        let guard = self.key.read().map_err(|_| VaultError::Locked)?;
        let key = guard.as_ref().ok_or(VaultError::Locked)?;
        f(key)
    }

    // ── Reads ──────────────────────────────────────────────────

    fn stored_rows(&self) -> VaultResult<Vec<StoredHolding>> {
        Ok(self.store.scan_json::<StoredHolding>(tables::HOLDINGS)?)
    }

    fn open_row(row: StoredHolding, key: &DerivedKey) -> VaultResult<Holding> {
        match row {
            StoredHolding::Encrypted(sealed) => sealed.open(key),
            StoredHolding::Legacy(plain) => Ok(plain),
        }
    }

    /// Every holding, decrypted, most recently updated first.
    ///
    /// Fails with [`VaultError::KeyMismatch`] if any field does not decrypt
    /// under the active key.
    pub fn get_holdings(&self) -> VaultResult<Vec<Holding>> {
        let rows = self.stored_rows()?;
        let mut holdings = self.with_key(|key| {
            rows.into_iter()
                .map(|row| Self::open_row(row, key))
                .collect::<VaultResult<Vec<_>>>()
        })?;
        holdings.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(holdings)
    }

    pub fn get_holding(&self, id: &str) -> VaultResult<Option<Holding>> {
        let Some(row) = self.store.get_json::<StoredHolding>(tables::HOLDINGS, id)? else {
            return Ok(None);
        };
        self.with_key(|key| Self::open_row(row, key)).map(Some)
    }

    pub fn holdings_by_location(&self, location_id: &str) -> VaultResult<Vec<Holding>> {
        Ok(self
            .get_holdings()?
            .into_iter()
            .filter(|h| h.location_id == location_id)
            .collect())
    }

    pub fn holdings_by_symbol(&self, symbol: &str) -> VaultResult<Vec<Holding>> {
        Ok(self
            .get_holdings()?
            .into_iter()
            .filter(|h| h.symbol.eq_ignore_ascii_case(symbol))
            .collect())
    }

    /// Holdings summed per symbol, ordered by symbol.
    pub fn aggregated_holdings(&self) -> VaultResult<Vec<AggregatedHolding>> {
        let mut by_symbol: BTreeMap<String, AggregatedHolding> = BTreeMap::new();
        for holding in self.get_holdings()? {
            let entry = by_symbol
                .entry(holding.symbol.clone())
                .or_insert_with(|| AggregatedHolding {
                    symbol: holding.symbol.clone(),
                    total_quantity: 0.0,
                    locations: Vec::new(),
                });
            entry.total_quantity += holding.quantity;
            entry.locations.push(LocationQuantity {
                location_id: holding.location_id,
                quantity: holding.quantity,
            });
        }
        Ok(by_symbol.into_values().collect())
    }

    // ── Writes ─────────────────────────────────────────────────

    fn validate(holding: &Holding) -> VaultResult<()> {
        if holding.symbol.trim().is_empty() {
            return Err(VaultError::InvalidHolding("symbol is empty".to_string()));
        }
        if !holding.quantity.is_finite() || holding.quantity < 0.0 {
            return Err(VaultError::InvalidHolding(format!(
                "quantity must be a non-negative number, got {}",
                holding.quantity
            )));
        }
        if holding.location_id.trim().is_empty() {
            return Err(VaultError::InvalidHolding("location is empty".to_string()));
        }
        Ok(())
    }

    fn write(&self, holding: &Holding) -> VaultResult<()> {
        let sealed = self.with_key(|key| EncryptedHolding::seal(holding, key))?;
        self.store.put_json(tables::HOLDINGS, &holding.id, &sealed)?;
        record_data_modified(self.store.as_ref(), holding.updated_at)?;
        Ok(())
    }

    pub fn add_holding(&self, input: NewHolding) -> VaultResult<Holding> {
        let mut holding = input.into_holding(now_millis());
        holding.symbol = holding.symbol.trim().to_uppercase();
        Self::validate(&holding)?;
        self.write(&holding)?;
        debug!("added holding {}", holding.id);
        Ok(holding)
    }

    pub fn update_holding(&self, id: &str, update: &HoldingUpdate) -> VaultResult<Holding> {
        let mut holding = self
            .get_holding(id)?
            .ok_or_else(|| VaultError::HoldingNotFound(id.to_string()))?;
        update.apply(&mut holding, now_millis());
        holding.symbol = holding.symbol.trim().to_uppercase();
        Self::validate(&holding)?;
        self.write(&holding)?;
        debug!("updated holding {id}");
        Ok(holding)
    }

    /// Physically removes a holding. Returns whether it existed.
    pub fn delete_holding(&self, id: &str) -> VaultResult<bool> {
        if !self.is_unlocked() {
            return Err(VaultError::Locked);
        }
        let removed = self.store.delete(tables::HOLDINGS, id)?;
        if removed {
            record_data_modified(self.store.as_ref(), now_millis())?;
            debug!("deleted holding {id}");
        }
        Ok(removed)
    }

    /// Atomically replaces every holding, keeping ids and timestamps.
    pub fn replace_holdings(&self, holdings: &[Holding]) -> VaultResult<()> {
        let mut batch = WriteBatch::new();
        batch.clear(tables::HOLDINGS);
        self.with_key(|key| {
            for holding in holdings {
                Self::validate(holding)?;
                let sealed = EncryptedHolding::seal(holding, key)?;
                batch.put_json(tables::HOLDINGS, &holding.id, &sealed)?;
            }
            Ok(())
        })?;
        self.store.commit(batch)?;
        info!("replaced local holdings ({} rows)", holdings.len());
        Ok(())
    }

    /// Deletes every stored holding. Used after a key mismatch.
    pub fn clear_incompatible_encrypted_data(&self) -> VaultResult<usize> {
        let count = self.store.count(tables::HOLDINGS)?;
        let mut batch = WriteBatch::new();
        batch.clear(tables::HOLDINGS);
        self.store.commit(batch)?;
        warn!("purged {count} holdings encrypted under an incompatible key");
        Ok(count)
    }

    /// Encrypts any plaintext rows left from before field encryption.
    pub fn migrate_unencrypted_data(&self) -> VaultResult<usize> {
        let legacy: Vec<Holding> = self
            .stored_rows()?
            .into_iter()
            .filter_map(|row| match row {
                StoredHolding::Legacy(plain) => Some(plain),
                StoredHolding::Encrypted(_) => None,
            })
            .collect();
        if legacy.is_empty() {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        self.with_key(|key| {
            for holding in &legacy {
                let sealed = EncryptedHolding::seal(holding, key)?;
                batch.put_json(tables::HOLDINGS, &holding.id, &sealed)?;
            }
            Ok(())
        })?;
        self.store.commit(batch)?;
        info!("encrypted {} legacy holdings", legacy.len());
        Ok(legacy.len())
    }

    /// Re-encrypts every holding under `new_key` and makes it the active key.
    pub fn reencrypt_all(&self, new_key: DerivedKey) -> VaultResult<usize> {
        let holdings = self.get_holdings()?;
        let mut batch = WriteBatch::new();
        batch.clear(tables::HOLDINGS);
        for holding in &holdings {
            let sealed = EncryptedHolding::seal(holding, &new_key)?;
            batch.put_json(tables::HOLDINGS, &holding.id, &sealed)?;
        }
        self.store.commit(batch)?;
        self.set_key(new_key);
        info!("re-encrypted {} holdings under a new key", holdings.len());
        Ok(holdings.len())
    }
}
