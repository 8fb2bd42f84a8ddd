//! Per-entity change tracking against the last reconciled snapshot.
//!
//! Metadata rows live in [`tables::SYNC_METADATA`]; deleted entities leave a
//! tombstone in [`tables::TOMBSTONES`] until the next successful sync round.
//! Entities without a metadata row (written before tracking existed, or by
//! a path that bypasses the tracker) get metadata derived from their stored
//! timestamp and the sync watermark.

use crate::error::SyncResult;
use crate::metadata::{
    action_for, create_default_metadata, is_unsynced_data, mark_as_deleted, mark_as_modified,
    mark_as_synced,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use coinvault_storage::{tables, KeyRange, TableStore, TableStoreExt, WriteBatch};
use coinvault_types::{EntityKind, SyncMetadata, UnsyncedDataCount, UnsyncedDataDetail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const WATERMARK_KEY: &str = "sync_watermark";

/// How long a computed unsynced count is served from cache.
pub const COUNT_CACHE_TTL: Duration = Duration::from_secs(5);

fn entity_key(kind: EntityKind, id: &str) -> String {
    format!("{kind}:{id}")
}

// ── Row headers ────────────────────────────────────────────────
// Only the clear-text identity of each row is read; encrypted fields are ignored.

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoldingHeader {
    id: String,
    symbol: String,
    #[serde(default)]
    updated_at: i64,
}

#[derive(Deserialize)]
struct LocationHeader {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct TokenHeader {
    symbol: String,
}

/// An entity currently present in local storage.
struct TrackedEntity {
    kind: EntityKind,
    id: String,
    name: String,
    /// Epoch ms of the last write, or 0 for kinds without timestamps.
    updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tombstone {
    kind: EntityKind,
    id: String,
    name: String,
    metadata: SyncMetadata,
}

struct CachedCount {
    at: Instant,
    sync_enabled: bool,
    count: UnsyncedDataCount,
}

/// Metadata for an untracked entity last written at `updated_at`.
fn legacy_metadata(updated_at: i64, watermark: Option<DateTime<Utc>>) -> SyncMetadata {
    let modified = DateTime::<Utc>::from_timestamp_millis(updated_at).unwrap_or_default();
    match watermark {
        Some(w) if modified <= w => mark_as_synced(create_default_metadata(modified), w),
        Some(_) => create_default_metadata(modified),
        None => mark_as_synced(create_default_metadata(modified), modified),
    }
}

fn load_watermark(store: &dyn TableStore) -> SyncResult<Option<DateTime<Utc>>> {
    let Some(ms) = store.get_json::<i64>(tables::SETTINGS, WATERMARK_KEY)? else {
        return Ok(None);
    };
    let now = Utc::now();
    let Some(at) = DateTime::<Utc>::from_timestamp_millis(ms) else {
        warn!("discarding unreadable sync watermark {ms}");
        return Ok(None);
    };
    if at > now || at < now - ChronoDuration::days(365) {
        warn!("discarding implausible sync watermark {at}");
        return Ok(None);
    }
    Ok(Some(at))
}

/// Tracks which holdings, locations and tokens differ from the last synced
/// snapshot.
pub struct ChangeTracker {
    store: Arc<dyn TableStore>,
    watermark: RwLock<Option<DateTime<Utc>>>,
    items: Mutex<HashMap<String, SyncMetadata>>,
    count: Mutex<Option<CachedCount>>,
}

impl ChangeTracker {
    /// Opens the tracker, loading the persisted watermark.
    pub fn new(store: Arc<dyn TableStore>) -> SyncResult<Self> {
        let watermark = load_watermark(store.as_ref())?;
        Ok(Self {
            store,
            watermark: RwLock::new(watermark),
            items: Mutex::new(HashMap::new()),
            count: Mutex::new(None),
        })
    }

    /// Time of the last successful sync round, if any.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark.read().ok().and_then(|w| *w)
    }

    pub fn set_watermark(&self, at: DateTime<Utc>) -> SyncResult<()> {
        self.store
            .put_json(tables::SETTINGS, WATERMARK_KEY, &at.timestamp_millis())?;
        if let Ok(mut w) = self.watermark.write() {
            *w = Some(at);
        }
        self.clear_cache();
        Ok(())
    }

    /// Drops both caches.
    pub fn clear_cache(&self) {
        if let Ok(mut items) = self.items.lock() {
            items.clear();
        }
        self.invalidate_count();
    }

    fn invalidate_count(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count = None;
        }
    }

    fn remember(&self, key: String, meta: SyncMetadata) {
        if let Ok(mut items) = self.items.lock() {
            items.insert(key, meta);
        }
        self.invalidate_count();
    }

    fn forget(&self, key: &str) {
        if let Ok(mut items) = self.items.lock() {
            items.remove(key);
        }
        self.invalidate_count();
    }

    // ── Recording ──────────────────────────────────────────────

    pub fn record_created(
        &self,
        kind: EntityKind,
        id: &str,
        sync_enabled: bool,
    ) -> SyncResult<SyncMetadata> {
        let mut meta = create_default_metadata(Utc::now());
        if !sync_enabled {
            meta.sync_disabled = Some(true);
        }
        let key = entity_key(kind, id);
        let mut batch = WriteBatch::new();
        batch
            .put_json(tables::SYNC_METADATA, &key, &meta)?
            .delete(tables::TOMBSTONES, &key);
        self.store.commit(batch)?;
        debug!("tracked new {key}");
        self.remember(key, meta.clone());
        Ok(meta)
    }

    pub fn record_modified(
        &self,
        kind: EntityKind,
        id: &str,
        sync_enabled: bool,
    ) -> SyncResult<SyncMetadata> {
        let now = Utc::now();
        let base = self
            .get_metadata(kind, id)?
            .unwrap_or_else(|| create_default_metadata(now));
        let mut meta = mark_as_modified(base, now);
        if !sync_enabled {
            meta.sync_disabled = Some(true);
        }
        let key = entity_key(kind, id);
        self.store.put_json(tables::SYNC_METADATA, &key, &meta)?;
        debug!("tracked change to {key} (v{})", meta.version);
        self.remember(key, meta.clone());
        Ok(meta)
    }

    /// Replaces the entity's metadata with a tombstone.
    ///
    /// An entity that was created and deleted without ever syncing leaves
    /// nothing behind.
    pub fn record_deleted(
        &self,
        kind: EntityKind,
        id: &str,
        name: &str,
        sync_enabled: bool,
    ) -> SyncResult<()> {
        let now = Utc::now();
        let key = entity_key(kind, id);
        let base = self.get_metadata(kind, id)?;
        let never_synced = base
            .as_ref()
            .is_some_and(|m| m.is_new && !m.is_synced && m.last_sync_time.is_none());

        let mut batch = WriteBatch::new();
        batch.delete(tables::SYNC_METADATA, &key);
        if never_synced {
            batch.delete(tables::TOMBSTONES, &key);
            debug!("dropped unsynced {key}");
        } else {
            let mut meta =
                mark_as_deleted(base.unwrap_or_else(|| create_default_metadata(now)), now);
            if !sync_enabled {
                meta.sync_disabled = Some(true);
            }
            let tombstone = Tombstone {
                kind,
                id: id.to_string(),
                name: name.to_string(),
                metadata: meta,
            };
            batch.put_json(tables::TOMBSTONES, &key, &tombstone)?;
            debug!("tombstoned {key}");
        }
        self.store.commit(batch)?;
        self.forget(&key);
        Ok(())
    }

    // ── Lookup ─────────────────────────────────────────────────

    /// Metadata for one entity: cached, stored, tombstoned, or derived from
    /// its row. `None` if the entity is unknown.
    pub fn get_metadata(&self, kind: EntityKind, id: &str) -> SyncResult<Option<SyncMetadata>> {
        let key = entity_key(kind, id);
        if let Some(meta) = self.items.lock().ok().and_then(|items| items.get(&key).cloned()) {
            return Ok(Some(meta));
        }

        let meta = if let Some(meta) = self
            .store
            .get_json::<SyncMetadata>(tables::SYNC_METADATA, &key)?
        {
            Some(meta)
        } else if let Some(tomb) = self.store.get_json::<Tombstone>(tables::TOMBSTONES, &key)? {
            Some(tomb.metadata)
        } else {
            self.entity(kind, id)?
                .map(|entity| legacy_metadata(entity.updated_at, self.watermark()))
        };

        if let Some(meta) = &meta {
            if let Ok(mut items) = self.items.lock() {
                items.insert(key, meta.clone());
            }
        }
        Ok(meta)
    }

    fn entity(&self, kind: EntityKind, id: &str) -> SyncResult<Option<TrackedEntity>> {
        let entity = match kind {
            EntityKind::Holding => self
                .store
                .get_json::<HoldingHeader>(tables::HOLDINGS, id)?
                .map(|h| TrackedEntity {
                    kind,
                    id: h.id,
                    name: h.symbol,
                    updated_at: h.updated_at,
                }),
            EntityKind::Location => self
                .store
                .get_json::<LocationHeader>(tables::LOCATIONS, id)?
                .map(|l| TrackedEntity {
                    kind,
                    id: l.id,
                    name: l.name,
                    updated_at: 0,
                }),
            EntityKind::Token => self
                .store
                .get_json::<TokenHeader>(tables::TOKENS, id)?
                .map(|t| TrackedEntity {
                    kind,
                    id: t.symbol.trim().to_uppercase(),
                    name: t.symbol,
                    updated_at: 0,
                }),
        };
        Ok(entity)
    }

    fn entities(&self) -> SyncResult<Vec<TrackedEntity>> {
        let mut out = Vec::new();
        for h in self.store.scan_json::<HoldingHeader>(tables::HOLDINGS)? {
            out.push(TrackedEntity {
                kind: EntityKind::Holding,
                id: h.id,
                name: h.symbol,
                updated_at: h.updated_at,
            });
        }
        for l in self.store.scan_json::<LocationHeader>(tables::LOCATIONS)? {
            out.push(TrackedEntity {
                kind: EntityKind::Location,
                id: l.id,
                name: l.name,
                updated_at: 0,
            });
        }
        for t in self.store.scan_json::<TokenHeader>(tables::TOKENS)? {
            out.push(TrackedEntity {
                kind: EntityKind::Token,
                id: t.symbol.trim().to_uppercase(),
                name: t.symbol,
                updated_at: 0,
            });
        }
        Ok(out)
    }

    fn stored_metadata(&self) -> SyncResult<HashMap<String, SyncMetadata>> {
        self.store
            .range(tables::SYNC_METADATA, &KeyRange::All)?
            .into_iter()
            .map(|(key, raw)| -> SyncResult<(String, SyncMetadata)> {
                Ok((key, serde_json::from_str(&raw)?))
            })
            .collect()
    }

    fn tombstones(&self) -> SyncResult<Vec<Tombstone>> {
        Ok(self.store.scan_json(tables::TOMBSTONES)?)
    }

    /// Every live entity and tombstone paired with its effective metadata.
    fn classified(&self) -> SyncResult<Vec<(EntityKind, String, String, SyncMetadata)>> {
        let watermark = self.watermark();
        let mut stored = self.stored_metadata()?;
        let mut out = Vec::new();
        for entity in self.entities()? {
            let meta = stored
                .remove(&entity_key(entity.kind, &entity.id))
                .unwrap_or_else(|| legacy_metadata(entity.updated_at, watermark));
            out.push((entity.kind, entity.id, entity.name, meta));
        }
        for tomb in self.tombstones()? {
            out.push((tomb.kind, tomb.id, tomb.name, tomb.metadata));
        }
        Ok(out)
    }

    // ── Queries ────────────────────────────────────────────────

    /// Counts unsynced entities, bypassing the cache.
    pub fn count_unsynced(&self, sync_enabled: bool) -> SyncResult<UnsyncedDataCount> {
        let watermark = self.watermark();
        let mut count = UnsyncedDataCount::default();
        for (kind, _, _, meta) in self.classified()? {
            if is_unsynced_data(&meta, watermark, sync_enabled) {
                count.add(kind);
            }
        }
        Ok(count)
    }

    /// Counts unsynced entities, serving a result computed within
    /// [`COUNT_CACHE_TTL`] when one exists.
    pub fn unsynced_count(&self, sync_enabled: bool) -> SyncResult<UnsyncedDataCount> {
        if let Ok(cache) = self.count.lock() {
            if let Some(cached) = cache.as_ref() {
                if cached.sync_enabled == sync_enabled && cached.at.elapsed() < COUNT_CACHE_TTL {
                    return Ok(cached.count);
                }
            }
        }
        let count = self.count_unsynced(sync_enabled)?;
        if let Ok(mut cache) = self.count.lock() {
            *cache = Some(CachedCount {
                at: Instant::now(),
                sync_enabled,
                count,
            });
        }
        Ok(count)
    }

    /// Pending changes, newest first. Deletions sort ahead of creations and
    /// updates made at the same instant.
    pub fn unsynced_details(&self, sync_enabled: bool) -> SyncResult<Vec<UnsyncedDataDetail>> {
        let watermark = self.watermark();
        let mut details: Vec<UnsyncedDataDetail> = self
            .classified()?
            .into_iter()
            .filter(|(_, _, _, meta)| is_unsynced_data(meta, watermark, sync_enabled))
            .map(|(kind, id, name, meta)| UnsyncedDataDetail {
                kind,
                id,
                name,
                action: action_for(&meta),
                last_modified: meta.last_modified,
            })
            .collect();
        details.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then(a.action.priority().cmp(&b.action.priority()))
        });
        Ok(details)
    }

    /// Marks every live entity synced, purges tombstones and metadata of
    /// vanished entities, and advances the watermark to now.
    pub fn mark_all_as_synced(&self) -> SyncResult<DateTime<Utc>> {
        let now = Utc::now();
        let watermark = self.watermark();
        let mut stored = self.stored_metadata()?;
        let purged = self.store.count(tables::TOMBSTONES)?;

        let mut batch = WriteBatch::new();
        batch
            .clear(tables::SYNC_METADATA)
            .clear(tables::TOMBSTONES);
        let entities = self.entities()?;
        for entity in &entities {
            let key = entity_key(entity.kind, &entity.id);
            let base = stored
                .remove(&key)
                .unwrap_or_else(|| legacy_metadata(entity.updated_at, watermark));
            batch.put_json(tables::SYNC_METADATA, &key, &mark_as_synced(base, now))?;
        }
        batch.put_json(tables::SETTINGS, WATERMARK_KEY, &now.timestamp_millis())?;
        self.store.commit(batch)?;

        if let Ok(mut w) = self.watermark.write() {
            *w = Some(now);
        }
        self.clear_cache();
        info!(
            "marked {} entities synced, purged {purged} tombstones",
            entities.len()
        );
        Ok(now)
    }
}
