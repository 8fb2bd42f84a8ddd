mod support;

use coinvault_cloud::{BackupCodec, MemoryRemoteStore, RemoteStore};
use coinvault_crypto::EncryptedPayload;
use coinvault_sync::snapshot::content_hash;
use coinvault_sync::{
    ConflictChoice, ErrorKind, SyncError, SyncOutcome, SyncState, SyncSuccess,
};
use coinvault_types::{HoldingUpdate, NewHolding};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use support::{fast_backup_kdf, Device, GatedStore, PASSWORD};

const FOLDER: &str = "CryptoPortfolioApp";
const FILE: &str = "portfolio-backup.json";

fn remote() -> Arc<MemoryRemoteStore> {
    Arc::new(MemoryRemoteStore::new())
}

fn read_remote(store: &MemoryRemoteStore, password: &str) -> coinvault_cloud::CloudBackup {
    let body = store.contents(FOLDER, FILE).expect("backup uploaded");
    let payload: EncryptedPayload = serde_json::from_slice(&body).unwrap();
    BackupCodec::new(fast_backup_kdf())
        .decrypt_portfolio_data(&payload, password)
        .unwrap()
}

fn success(outcome: SyncOutcome) -> SyncSuccess {
    match outcome {
        SyncOutcome::Success(result) => result,
        other => panic!("expected success, got {other:?}"),
    }
}

/// Two devices synced on BTC 0.5 at a ledger.
async fn synced_pair(remote: Arc<MemoryRemoteStore>) -> (Device, Device) {
    let a = Device::new(remote.clone());
    a.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap();
    a.portfolio
        .add_holding(NewHolding::new("BTC", 0.5, "ledger"))
        .unwrap();
    assert_eq!(
        success(a.coordinator.perform_sync().await.unwrap()),
        SyncSuccess::PushedLocal
    );

    let b = Device::new(remote);
    assert_eq!(
        success(b.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap()),
        SyncSuccess::AppliedRemote
    );
    assert_eq!(b.quantities(), vec![("BTC".to_string(), 0.5)]);
    (a, b)
}

#[tokio::test]
async fn end_to_end_first_backup() {
    let remote = remote();
    let device = Device::new(remote.clone());
    device.auth.setup_password(PASSWORD).await.unwrap();
    device
        .portfolio
        .add_holding(NewHolding::new("BTC", 1.0, "ledger"))
        .unwrap();
    device
        .portfolio
        .add_holding(NewHolding::new("ETH", 2.0, "metamask"))
        .unwrap();
    assert_eq!(device.coordinator.unsynced_count().unwrap().holdings, 2);

    let outcome = device.coordinator.enable_sync(PASSWORD).await.unwrap();
    assert_eq!(success(outcome), SyncSuccess::InitialUpload);

    let backup = read_remote(&remote, PASSWORD);
    let mut rows: Vec<_> = backup
        .portfolio_data
        .holdings
        .iter()
        .map(|h| (h.symbol.clone(), h.quantity, h.location_id.clone()))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        rows,
        vec![
            ("BTC".to_string(), 1.0, "ledger".to_string()),
            ("ETH".to_string(), 2.0, "metamask".to_string()),
        ]
    );

    let status = device.coordinator.status().unwrap();
    assert!(status.enabled);
    assert!(status.last_sync_time.is_some());
    assert!(status.last_sync_error.is_none());
    assert!(status.auto_sync_active);
    assert_eq!(device.coordinator.unsynced_count().unwrap().total, 0);
}

#[tokio::test]
async fn second_round_is_idempotent() {
    let remote = remote();
    let device = Device::new(remote.clone());
    device.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap();
    device
        .portfolio
        .add_holding(NewHolding::new("BTC", 1.0, "ledger"))
        .unwrap();
    device.coordinator.perform_sync().await.unwrap();
    let uploads = remote.upload_count();

    let outcome = device.coordinator.perform_sync().await.unwrap();
    assert_eq!(success(outcome), SyncSuccess::AlreadyInSync);
    assert_eq!(remote.upload_count(), uploads);
}

#[tokio::test]
async fn concurrent_edits_raise_conflict() {
    let remote = remote();
    let (a, b) = synced_pair(remote.clone()).await;
    let id = b.portfolio.holdings().unwrap()[0].id.clone();

    a.portfolio
        .update_holding(&id, &HoldingUpdate::quantity(1.5))
        .unwrap();
    assert_eq!(
        success(a.coordinator.perform_sync().await.unwrap()),
        SyncSuccess::PushedLocal
    );

    b.portfolio
        .update_holding(&id, &HoldingUpdate::quantity(1.0))
        .unwrap();
    let uploads = remote.upload_count();
    let SyncOutcome::Conflict(conflict) = b.coordinator.perform_sync().await.unwrap() else {
        panic!("expected a conflict");
    };
    assert_eq!(conflict.local_data.holdings[0].quantity, 1.0);
    assert_eq!(conflict.cloud_data.holdings[0].quantity, 1.5);
    assert_eq!(remote.upload_count(), uploads);
    assert_eq!(b.quantities(), vec![("BTC".to_string(), 1.0)]);

    let status = b.coordinator.status().unwrap();
    assert_eq!(status.state, SyncState::ConflictPending);
    assert!(status.has_pending_conflict);
}

#[tokio::test]
async fn resolve_conflict_with_local() {
    let remote = remote();
    let (a, b) = synced_pair(remote.clone()).await;
    let id = b.portfolio.holdings().unwrap()[0].id.clone();
    a.portfolio.update_holding(&id, &HoldingUpdate::quantity(1.5)).unwrap();
    a.coordinator.perform_sync().await.unwrap();
    b.portfolio.update_holding(&id, &HoldingUpdate::quantity(1.0)).unwrap();
    b.coordinator.perform_sync().await.unwrap();

    let outcome = b
        .coordinator
        .resolve_conflict(ConflictChoice::Local)
        .await
        .unwrap();
    assert_eq!(success(outcome), SyncSuccess::ResolvedWithLocal);
    assert!(b.coordinator.pending_conflict().is_none());
    assert_eq!(read_remote(&remote, PASSWORD).portfolio_data.holdings[0].quantity, 1.0);

    assert_eq!(
        success(a.coordinator.perform_sync().await.unwrap()),
        SyncSuccess::AppliedRemote
    );
    assert_eq!(a.quantities(), vec![("BTC".to_string(), 1.0)]);
}

#[tokio::test]
async fn resolve_conflict_with_cloud() {
    let remote = remote();
    let (a, b) = synced_pair(remote.clone()).await;
    let id = b.portfolio.holdings().unwrap()[0].id.clone();
    a.portfolio.update_holding(&id, &HoldingUpdate::quantity(1.5)).unwrap();
    a.coordinator.perform_sync().await.unwrap();
    b.portfolio.update_holding(&id, &HoldingUpdate::quantity(1.0)).unwrap();
    b.coordinator.perform_sync().await.unwrap();
    let uploads = remote.upload_count();

    let outcome = b
        .coordinator
        .resolve_conflict(ConflictChoice::Cloud)
        .await
        .unwrap();
    assert_eq!(success(outcome), SyncSuccess::ResolvedWithCloud);
    assert_eq!(b.quantities(), vec![("BTC".to_string(), 1.5)]);
    assert_eq!(remote.upload_count(), uploads + 1);
    assert_eq!(read_remote(&remote, PASSWORD).portfolio_data.holdings[0].quantity, 1.5);
    assert_eq!(b.coordinator.unsynced_count().unwrap().total, 0);
    assert_eq!(
        success(b.coordinator.perform_sync().await.unwrap()),
        SyncSuccess::AlreadyInSync
    );
}

#[tokio::test]
async fn resolve_without_conflict_is_rejected() {
    let device = Device::new(remote());
    device.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap();
    assert!(matches!(
        device.coordinator.resolve_conflict(ConflictChoice::Local).await,
        Err(SyncError::NoConflict)
    ));
}

#[tokio::test]
async fn clear_conflict_state_returns_to_idle() {
    let remote = remote();
    let (a, b) = synced_pair(remote).await;
    let id = b.portfolio.holdings().unwrap()[0].id.clone();
    a.portfolio.update_holding(&id, &HoldingUpdate::quantity(2.0)).unwrap();
    a.coordinator.perform_sync().await.unwrap();
    b.portfolio.update_holding(&id, &HoldingUpdate::quantity(3.0)).unwrap();
    b.coordinator.perform_sync().await.unwrap();

    b.coordinator.clear_conflict_state();
    assert!(b.coordinator.pending_conflict().is_none());
    assert_eq!(b.coordinator.status().unwrap().state, SyncState::Idle);
}

#[tokio::test]
async fn superset_of_remote_is_pushed() {
    let remote = remote();
    let a = Device::new(remote.clone());
    a.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap();
    a.portfolio
        .add_holding(NewHolding::new("BTC", 0.5, "ledger"))
        .unwrap();
    a.coordinator.perform_sync().await.unwrap();

    // A second install with the same BTC row plus a new one, never synced.
    let b = Device::new(remote.clone());
    b.auth.setup_password(PASSWORD).await.unwrap();
    b.portfolio
        .add_holding(NewHolding::new("BTC", 0.5, "ledger"))
        .unwrap();
    b.portfolio
        .add_holding(NewHolding::new("SOL", 3.0, "phantom"))
        .unwrap();
    let outcome = b.coordinator.enable_sync(PASSWORD).await.unwrap();
    assert_eq!(success(outcome), SyncSuccess::PushedLocal);

    assert_eq!(
        success(a.coordinator.perform_sync().await.unwrap()),
        SyncSuccess::AppliedRemote
    );
    assert_eq!(
        a.quantities(),
        vec![("BTC".to_string(), 0.5), ("SOL".to_string(), 3.0)]
    );
}

#[tokio::test]
async fn deletion_propagates() {
    let remote = remote();
    let (a, b) = synced_pair(remote).await;
    let id = a.portfolio.holdings().unwrap()[0].id.clone();

    assert!(a.portfolio.delete_holding(&id).unwrap());
    assert_eq!(a.coordinator.unsynced_count().unwrap().total, 1);
    assert_eq!(
        success(a.coordinator.perform_sync().await.unwrap()),
        SyncSuccess::PushedLocal
    );
    assert_eq!(a.coordinator.unsynced_count().unwrap().total, 0);

    assert_eq!(
        success(b.coordinator.perform_sync().await.unwrap()),
        SyncSuccess::AppliedRemote
    );
    assert!(b.quantities().is_empty());
}

#[tokio::test]
async fn locked_vault_fails_round() {
    let device = Device::new(remote());
    device.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap();
    device.vault.lock();

    let SyncOutcome::Failed(failure) = device.coordinator.perform_sync().await.unwrap() else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, ErrorKind::LockedStorage);
    let status = device.coordinator.status().unwrap();
    assert_eq!(status.last_error_kind, Some(ErrorKind::LockedStorage));
    assert!(status.last_sync_error.is_some());
    assert_eq!(status.state, SyncState::Idle);
}

#[tokio::test]
async fn signed_out_session_fails_round() {
    let device = Device::new(remote());
    device.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap();
    device.session.set_authenticated(false);

    let SyncOutcome::Failed(failure) = device.coordinator.perform_sync().await.unwrap() else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, ErrorKind::AuthFailure);
}

#[tokio::test]
async fn sync_requires_enabling() {
    let device = Device::new(remote());
    assert!(matches!(
        device.coordinator.perform_sync().await,
        Err(SyncError::NotEnabled)
    ));
}

#[tokio::test]
async fn weak_backup_password_rejected() {
    let device = Device::new(remote());
    let err = device
        .coordinator
        .enable_sync_for_new_user("abcd1234")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::WeakPassword(_)));
    assert!(!device.coordinator.status().unwrap().enabled);
}

#[tokio::test]
async fn wrong_password_for_existing_backup_rejected() {
    let remote = remote();
    let a = Device::new(remote.clone());
    a.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap();

    let b = Device::new(remote);
    let err = b
        .coordinator
        .enable_sync_for_new_user("Other5678!")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongPassword);
    assert!(!b.coordinator.status().unwrap().enabled);
}

#[tokio::test]
async fn reentrant_round_is_rejected() {
    let gated = Arc::new(GatedStore::default());
    let remote: Arc<dyn RemoteStore> = gated.clone();
    let device = Device::new(remote);
    device.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap();

    gated.armed.store(true, Ordering::SeqCst);
    let coordinator = Arc::clone(&device.coordinator);
    let first = tokio::spawn(async move { coordinator.perform_sync().await });
    while device.coordinator.status().unwrap().state != SyncState::Syncing {
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        device.coordinator.perform_sync().await,
        Err(SyncError::Busy)
    ));
    gated.release.notify_one();
    assert!(first.await.unwrap().unwrap().is_success());
    assert!(device.coordinator.perform_sync().await.unwrap().is_success());
}

#[tokio::test]
async fn change_cloud_password_reencrypts_backup() {
    let remote = remote();
    let device = Device::new(remote.clone());
    device.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap();
    device
        .portfolio
        .add_holding(NewHolding::new("BTC", 1.0, "ledger"))
        .unwrap();
    device.coordinator.perform_sync().await.unwrap();

    device
        .coordinator
        .change_cloud_password(PASSWORD, "Newpass99!")
        .await
        .unwrap();
    assert!(device.coordinator.test_cloud_password("Newpass99!").await.unwrap());
    assert!(!device.coordinator.test_cloud_password(PASSWORD).await.unwrap());
    assert_eq!(read_remote(&remote, "Newpass99!").portfolio_data.holdings.len(), 1);
    assert_eq!(
        success(device.coordinator.perform_sync().await.unwrap()),
        SyncSuccess::AlreadyInSync
    );
}

#[tokio::test]
async fn change_cloud_password_with_wrong_current_keeps_backup() {
    let remote = remote();
    let device = Device::new(remote.clone());
    device.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap();

    let err = device
        .coordinator
        .change_cloud_password("Wrong1234!", "Newpass99!")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongPassword);
    assert!(device.coordinator.test_cloud_password(PASSWORD).await.unwrap());
    assert!(device.coordinator.perform_sync().await.unwrap().is_success());
}

#[tokio::test]
async fn disable_sync_forgets_password_but_keeps_key() {
    let device = Device::new(remote());
    device.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap();
    device.coordinator.disable_sync().unwrap();

    let status = device.coordinator.status().unwrap();
    assert!(!status.enabled);
    assert!(!status.has_password);
    assert!(!status.auto_sync_active);
    assert!(device.vault.is_unlocked());
    assert!(matches!(
        device.coordinator.perform_sync().await,
        Err(SyncError::NotEnabled)
    ));
}

#[tokio::test]
async fn new_user_enable_requires_fresh_install() {
    let device = Device::new(remote());
    device.auth.setup_password(PASSWORD).await.unwrap();
    assert!(device
        .coordinator
        .enable_sync_for_new_user(PASSWORD)
        .await
        .is_err());
}

#[tokio::test]
async fn note_edit_reaches_remote() {
    let remote = remote();
    let device = Device::new(remote.clone());
    device.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap();
    let holding = device
        .portfolio
        .add_holding(NewHolding::new("BTC", 1.0, "ledger"))
        .unwrap();
    device.coordinator.perform_sync().await.unwrap();

    let update = HoldingUpdate {
        note: Some(Some("cold wallet".to_string())),
        ..HoldingUpdate::default()
    };
    device.portfolio.update_holding(&holding.id, &update).unwrap();
    assert_eq!(device.coordinator.unsynced_count().unwrap().total, 1);

    assert_eq!(
        success(device.coordinator.perform_sync().await.unwrap()),
        SyncSuccess::PushedLocal
    );
    let backup = read_remote(&remote, PASSWORD);
    assert_eq!(
        backup.portfolio_data.holdings[0].note.as_deref(),
        Some("cold wallet")
    );
    assert_eq!(device.coordinator.unsynced_count().unwrap().total, 0);
}

#[tokio::test]
async fn re_enable_with_same_password_converges() {
    let remote = remote();
    let device = Device::new(remote.clone());
    assert_eq!(
        success(device.coordinator.enable_sync_for_new_user(PASSWORD).await.unwrap()),
        SyncSuccess::InitialUpload
    );
    device
        .portfolio
        .add_holding(NewHolding::new("BTC", 1.0, "ledger"))
        .unwrap();
    device.coordinator.perform_sync().await.unwrap();
    device.coordinator.disable_sync().unwrap();

    device
        .portfolio
        .add_holding(NewHolding::new("ETH", 2.0, "metamask"))
        .unwrap();

    let outcome = device.coordinator.enable_sync(PASSWORD).await.unwrap();
    assert_eq!(success(outcome), SyncSuccess::PushedLocal);
    assert!(device.coordinator.pending_conflict().is_none());

    let local = coinvault_types::PortfolioSnapshot::new(
        device.portfolio.holdings().unwrap(),
        device.portfolio.locations().unwrap(),
        device.portfolio.tokens().unwrap(),
    );
    let backup = read_remote(&remote, PASSWORD);
    assert_eq!(
        content_hash(&local).unwrap(),
        content_hash(&backup.portfolio_data).unwrap()
    );

    device.coordinator.disable_sync().unwrap();
    let outcome = device.coordinator.enable_sync(PASSWORD).await.unwrap();
    assert_eq!(success(outcome), SyncSuccess::AlreadyInSync);
}
