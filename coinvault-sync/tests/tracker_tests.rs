use chrono::{Duration as ChronoDuration, Utc};
use coinvault_storage::{tables, MemoryTableStore, TableStore, TableStoreExt};
use coinvault_sync::ChangeTracker;
use coinvault_types::{EntityKind, NewHolding, SyncAction};
use coinvault_vault::{Catalog, EncryptedVault, NoKeyCache};
use coinvault_crypto::generate_random_key;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    store: Arc<dyn TableStore>,
    vault: EncryptedVault,
    catalog: Catalog,
    tracker: ChangeTracker,
}

fn fixture() -> Fixture {
    let store: Arc<dyn TableStore> = Arc::new(MemoryTableStore::new());
    let vault = EncryptedVault::new(Arc::clone(&store), Arc::new(NoKeyCache));
    vault.set_key(generate_random_key());
    let catalog = Catalog::new(Arc::clone(&store));
    catalog.ensure_initial_data().unwrap();
    let tracker = ChangeTracker::new(Arc::clone(&store)).unwrap();
    Fixture {
        store,
        vault,
        catalog,
        tracker,
    }
}

#[test]
fn seeded_presets_are_not_pending() {
    let f = fixture();
    assert_eq!(f.tracker.count_unsynced(true).unwrap().total, 0);
}

#[test]
fn created_holding_is_pending() {
    let f = fixture();
    let h = f.vault.add_holding(NewHolding::new("btc", 1.0, "ledger")).unwrap();
    f.tracker.record_created(EntityKind::Holding, &h.id, true).unwrap();

    let count = f.tracker.unsynced_count(true).unwrap();
    assert_eq!(count.holdings, 1);
    assert_eq!(count.total, 1);

    let details = f.tracker.unsynced_details(true).unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].name, "BTC");
    assert_eq!(details[0].action, SyncAction::Created);
}

#[test]
fn untracked_write_after_watermark_is_pending() {
    let f = fixture();
    f.tracker
        .set_watermark(Utc::now() - ChronoDuration::minutes(1))
        .unwrap();
    f.vault.add_holding(NewHolding::new("ETH", 2.0, "metamask")).unwrap();
    let details = f.tracker.unsynced_details(true).unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].action, SyncAction::Created);
}

#[test]
fn mark_all_as_synced_clears_everything() {
    let f = fixture();
    let a = f.vault.add_holding(NewHolding::new("BTC", 1.0, "ledger")).unwrap();
    let b = f.vault.add_holding(NewHolding::new("ETH", 2.0, "ledger")).unwrap();
    f.tracker.record_created(EntityKind::Holding, &a.id, true).unwrap();
    f.tracker.record_created(EntityKind::Holding, &b.id, true).unwrap();
    f.tracker.mark_all_as_synced().unwrap();

    f.vault.delete_holding(&b.id).unwrap();
    f.tracker
        .record_deleted(EntityKind::Holding, &b.id, "ETH", true)
        .unwrap();
    assert_eq!(f.store.count(tables::TOMBSTONES).unwrap(), 1);

    let watermark = f.tracker.mark_all_as_synced().unwrap();
    assert_eq!(f.tracker.watermark(), Some(watermark));
    assert_eq!(f.tracker.count_unsynced(true).unwrap().total, 0);
    assert_eq!(f.store.count(tables::TOMBSTONES).unwrap(), 0);
    assert!(f
        .tracker
        .get_metadata(EntityKind::Holding, &b.id)
        .unwrap()
        .is_none());
}

#[test]
fn tombstones_survive_reload() {
    let f = fixture();
    let h = f.vault.add_holding(NewHolding::new("SOL", 3.0, "phantom")).unwrap();
    f.tracker.record_created(EntityKind::Holding, &h.id, true).unwrap();
    f.tracker.mark_all_as_synced().unwrap();
    f.vault.delete_holding(&h.id).unwrap();
    f.tracker
        .record_deleted(EntityKind::Holding, &h.id, "SOL", true)
        .unwrap();

    let reloaded = ChangeTracker::new(Arc::clone(&f.store)).unwrap();
    let details = reloaded.unsynced_details(true).unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].id, h.id);
    assert_eq!(details[0].action, SyncAction::Deleted);
    assert_eq!(details[0].name, "SOL");
}

#[test]
fn create_then_delete_before_sync_leaves_nothing() {
    let f = fixture();
    let h = f.vault.add_holding(NewHolding::new("ADA", 10.0, "ledger")).unwrap();
    f.tracker.record_created(EntityKind::Holding, &h.id, true).unwrap();
    f.vault.delete_holding(&h.id).unwrap();
    f.tracker
        .record_deleted(EntityKind::Holding, &h.id, "ADA", true)
        .unwrap();
    assert_eq!(f.tracker.count_unsynced(true).unwrap().total, 0);
}

#[test]
fn modification_after_sync_is_update() {
    let f = fixture();
    let h = f.vault.add_holding(NewHolding::new("BTC", 1.0, "ledger")).unwrap();
    f.tracker.record_created(EntityKind::Holding, &h.id, true).unwrap();
    f.tracker.mark_all_as_synced().unwrap();

    let meta = f
        .tracker
        .record_modified(EntityKind::Holding, &h.id, true)
        .unwrap();
    assert_eq!(meta.version, 2);
    let details = f.tracker.unsynced_details(true).unwrap();
    assert_eq!(details[0].action, SyncAction::Updated);
}

#[test]
fn details_are_newest_first() {
    let f = fixture();
    let location = f.catalog.add_custom_location("Cold storage").unwrap();
    f.tracker
        .record_created(EntityKind::Location, &location.id, true)
        .unwrap();
    std::thread::sleep(Duration::from_millis(5));
    let h = f.vault.add_holding(NewHolding::new("BTC", 1.0, &location.id)).unwrap();
    f.tracker.record_created(EntityKind::Holding, &h.id, true).unwrap();

    let details = f.tracker.unsynced_details(true).unwrap();
    assert_eq!(details.len(), 2);
    assert_eq!(details[0].kind, EntityKind::Holding);
    assert_eq!(details[1].kind, EntityKind::Location);
    assert_eq!(details[1].name, "Cold storage");
}

#[test]
fn created_while_disabled_depends_on_sync_state() {
    let f = fixture();
    let h = f.vault.add_holding(NewHolding::new("DOT", 4.0, "ledger")).unwrap();
    let meta = f.tracker.record_created(EntityKind::Holding, &h.id, false).unwrap();
    assert_eq!(meta.sync_disabled, Some(true));
    assert_eq!(f.tracker.count_unsynced(false).unwrap().total, 1);
    assert_eq!(f.tracker.count_unsynced(true).unwrap().total, 1);

    f.tracker.mark_all_as_synced().unwrap();
    let meta = f
        .tracker
        .get_metadata(EntityKind::Holding, &h.id)
        .unwrap()
        .unwrap();
    assert!(meta.sync_disabled.is_none());
}

#[test]
fn implausible_watermarks_are_discarded() {
    let store: Arc<dyn TableStore> = Arc::new(MemoryTableStore::new());
    let old = (Utc::now() - ChronoDuration::days(400)).timestamp_millis();
    store.put_json(tables::SETTINGS, "sync_watermark", &old).unwrap();
    assert!(ChangeTracker::new(Arc::clone(&store)).unwrap().watermark().is_none());

    let future = (Utc::now() + ChronoDuration::days(1)).timestamp_millis();
    store.put_json(tables::SETTINGS, "sync_watermark", &future).unwrap();
    assert!(ChangeTracker::new(Arc::clone(&store)).unwrap().watermark().is_none());

    let recent = (Utc::now() - ChronoDuration::days(1)).timestamp_millis();
    store.put_json(tables::SETTINGS, "sync_watermark", &recent).unwrap();
    assert!(ChangeTracker::new(store).unwrap().watermark().is_some());
}

#[tokio::test(start_paused = true)]
async fn count_is_cached_for_ttl() {
    let f = fixture();
    assert_eq!(f.tracker.unsynced_count(true).unwrap().total, 0);

    // A write that bypasses the tracker is invisible until the cache expires.
    f.tracker
        .set_watermark(Utc::now() - ChronoDuration::minutes(1))
        .unwrap();
    assert_eq!(f.tracker.unsynced_count(true).unwrap().total, 0);
    f.vault.add_holding(NewHolding::new("BTC", 1.0, "ledger")).unwrap();
    assert_eq!(f.tracker.unsynced_count(true).unwrap().total, 0);
    assert_eq!(f.tracker.count_unsynced(true).unwrap().total, 1);

    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(f.tracker.unsynced_count(true).unwrap().total, 1);
}

#[test]
fn clear_cache_forces_recount() {
    let f = fixture();
    f.tracker
        .set_watermark(Utc::now() - ChronoDuration::minutes(1))
        .unwrap();
    assert_eq!(f.tracker.unsynced_count(true).unwrap().total, 0);
    f.vault.add_holding(NewHolding::new("BTC", 1.0, "ledger")).unwrap();
    f.tracker.clear_cache();
    assert_eq!(f.tracker.unsynced_count(true).unwrap().total, 1);
}
