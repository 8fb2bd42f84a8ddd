//! Reconciles the local portfolio with the single encrypted remote backup.
//!
//! A round compares normalized content hashes. Local changes are pushed when
//! the remote is still the last agreed snapshot or the local side only adds
//! to it; remote content is applied when nothing local is pending. Anything
//! else is surfaced as a [`SyncConflict`] and never merged automatically.

use crate::error::{SyncError, SyncResult};
use crate::snapshot::{content_hash, is_additive};
use crate::status::{
    ConflictChoice, SyncConflict, SyncEvent, SyncFailure, SyncOutcome, SyncRecord, SyncState,
    SyncStatus, SyncSuccess,
};
use crate::tracker::ChangeTracker;
use coinvault_cloud::{BackupClient, BackupError, RemoteSession, RemoteStore, SyncConfig};
use coinvault_crypto::PasswordPolicy;
use coinvault_storage::TableStore;
use coinvault_types::{PortfolioSnapshot, UnsyncedDataCount, UnsyncedDataDetail};
use coinvault_vault::{
    last_data_modified, record_data_modified, AuthService, Catalog, EncryptedVault, VaultError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Releases the in-progress flag when a round ends, however it ends.
struct RoundGuard<'a>(&'a AtomicBool);

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum Round {
    Done { result: SyncSuccess, hash: String },
    Conflict(SyncConflict),
}

/// Drives sync rounds, conflict resolution and the auto-sync timer.
pub struct SyncCoordinator {
    auth: Arc<AuthService>,
    catalog: Arc<Catalog>,
    tracker: Arc<ChangeTracker>,
    client: BackupClient,
    session: Arc<dyn RemoteSession>,
    config: SyncConfig,
    in_progress: AtomicBool,
    /// Backup password. Held in memory only.
    password: RwLock<Option<String>>,
    state: Mutex<SyncState>,
    conflict: Mutex<Option<SyncConflict>>,
    events: broadcast::Sender<SyncEvent>,
    auto_sync: Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    pub fn new(
        auth: Arc<AuthService>,
        catalog: Arc<Catalog>,
        tracker: Arc<ChangeTracker>,
        remote: Arc<dyn RemoteStore>,
        session: Arc<dyn RemoteSession>,
        config: SyncConfig,
    ) -> SyncResult<Arc<Self>> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Arc::new(Self {
            auth,
            catalog,
            tracker,
            client: BackupClient::new(remote, &config),
            session,
            config,
            in_progress: AtomicBool::new(false),
            password: RwLock::new(None),
            state: Mutex::new(SyncState::Idle),
            conflict: Mutex::new(None),
            events,
            auto_sync: Mutex::new(None),
        }))
    }

    fn vault(&self) -> &Arc<EncryptedVault> {
        self.auth.vault()
    }

    fn store(&self) -> &dyn TableStore {
        self.vault().store().as_ref()
    }

    fn record(&self) -> SyncResult<SyncRecord> {
        SyncRecord::load(self.store())
    }

    fn emit(&self, event: SyncEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: SyncState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    fn set_conflict(&self, conflict: Option<SyncConflict>) {
        if let Ok(mut guard) = self.conflict.lock() {
            *guard = conflict;
        }
    }

    fn backup_password(&self) -> Option<String> {
        self.password.read().ok().and_then(|pw| pw.clone())
    }

    fn set_password(&self, password: Option<&str>) {
        if let Ok(mut guard) = self.password.write() {
            *guard = password.map(str::to_string);
        }
    }

    fn acquire(&self) -> SyncResult<RoundGuard<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SyncError::Busy)?;
        Ok(RoundGuard(&self.in_progress))
    }

    fn begin_round(&self) -> SyncResult<RoundGuard<'_>> {
        let guard = self.acquire()?;
        self.set_state(SyncState::Syncing);
        self.emit(SyncEvent::Started);
        Ok(guard)
    }

    fn local_snapshot(&self) -> SyncResult<PortfolioSnapshot> {
        Ok(PortfolioSnapshot::new(
            self.vault().get_holdings()?,
            self.catalog.locations()?,
            self.catalog.tokens()?,
        ))
    }

    fn apply_remote(&self, data: &PortfolioSnapshot, timestamp: i64) -> SyncResult<()> {
        self.vault().replace_holdings(&data.holdings)?;
        self.catalog.replace_catalog(&data.locations, &data.tokens)?;
        record_data_modified(self.store(), timestamp)?;
        info!(
            "applied remote backup: {} holdings, {} locations, {} tokens",
            data.holdings.len(),
            data.locations.len(),
            data.tokens.len()
        );
        Ok(())
    }

    fn check_backup_policy(password: &str) -> SyncResult<()> {
        let violations = PasswordPolicy::backup().violations(password);
        if violations.is_empty() {
            return Ok(());
        }
        let reasons: Vec<String> = violations.iter().map(ToString::to_string).collect();
        Err(SyncError::WeakPassword(reasons.join(", ")))
    }

    // ── Sync rounds ────────────────────────────────────────────

    /// Runs one sync round.
    ///
    /// Returns `Err` only when the round could not start: sync disabled, no
    /// backup password, or a round already running. Failures during the
    /// round are recorded and returned as [`SyncOutcome::Failed`].
    pub async fn perform_sync(&self) -> SyncResult<SyncOutcome> {
        let record = self.record()?;
        if !record.enabled {
            return Err(SyncError::NotEnabled);
        }
        let password = self.backup_password().ok_or(SyncError::PasswordMissing)?;
        let _guard = self.begin_round()?;
        let round = self
            .sync_round(&password, record.baseline_hash.as_deref())
            .await;
        Ok(self.finish(round))
    }

    async fn sync_round(&self, password: &str, baseline: Option<&str>) -> SyncResult<Round> {
        if !self.vault().try_auto_unlock() {
            return Err(SyncError::Locked);
        }
        if !self.session.is_authenticated().await {
            return Err(SyncError::NotAuthenticated);
        }

        let local = self.local_snapshot()?;
        let local_hash = content_hash(&local)?;
        let local_modified = last_data_modified(self.store())?;

        let Some(remote) = self.client.download(password).await? else {
            info!("no remote backup yet, uploading local data");
            self.client.upload(&local, password).await?;
            return Ok(Round::Done {
                result: SyncSuccess::InitialUpload,
                hash: local_hash,
            });
        };

        let remote_hash = content_hash(&remote.portfolio_data)?;
        if local_hash == remote_hash {
            debug!("local and remote content match");
            return Ok(Round::Done {
                result: SyncSuccess::AlreadyInSync,
                hash: local_hash,
            });
        }

        let pending = self.tracker.count_unsynced(true)?;
        if pending.total > 0 {
            let remote_unchanged = baseline == Some(remote_hash.as_str());
            if remote_unchanged || is_additive(&local, &remote.portfolio_data) {
                info!("pushing {} local changes", pending.total);
                self.client.upload(&local, password).await?;
                return Ok(Round::Done {
                    result: SyncSuccess::PushedLocal,
                    hash: local_hash,
                });
            }

            let window = self.config.conflict_check_interval().as_millis() as i64;
            let timestamps_close =
                local_modified.is_some_and(|at| (at - remote.timestamp).abs() <= window);
            return Ok(Round::Conflict(SyncConflict {
                local_data: local,
                cloud_data: remote.portfolio_data,
                local_timestamp: local_modified,
                cloud_timestamp: remote.timestamp,
                timestamps_close,
            }));
        }

        if local_modified.is_some_and(|at| at > remote.timestamp) {
            info!("local data is newer than the remote backup, uploading");
            self.client.upload(&local, password).await?;
            Ok(Round::Done {
                result: SyncSuccess::PushedLocal,
                hash: local_hash,
            })
        } else {
            self.apply_remote(&remote.portfolio_data, remote.timestamp)?;
            Ok(Round::Done {
                result: SyncSuccess::AppliedRemote,
                hash: remote_hash,
            })
        }
    }

    fn finish(&self, round: SyncResult<Round>) -> SyncOutcome {
        match round.and_then(|round| self.settle(round)) {
            Ok(outcome) => outcome,
            Err(e) => self.fail(e),
        }
    }

    fn settle(&self, round: Round) -> SyncResult<SyncOutcome> {
        match round {
            Round::Done { result, hash } => {
                let at = self.tracker.mark_all_as_synced()?.timestamp_millis();
                let mut record = self.record()?;
                record.last_sync_time = Some(at);
                record.last_sync_error = None;
                record.last_error_kind = None;
                record.baseline_hash = Some(hash);
                record.save(self.store())?;

                self.set_conflict(None);
                self.set_state(SyncState::Idle);
                info!("sync round complete: {result:?}");
                self.emit(SyncEvent::Completed { result, at });
                Ok(SyncOutcome::Success(result))
            }
            Round::Conflict(conflict) => {
                warn!(
                    "sync conflict: local and remote both changed (close: {})",
                    conflict.timestamps_close
                );
                self.set_conflict(Some(conflict.clone()));
                self.set_state(SyncState::ConflictPending);
                self.emit(SyncEvent::ConflictDetected {
                    local_timestamp: conflict.local_timestamp,
                    cloud_timestamp: conflict.cloud_timestamp,
                });
                Ok(SyncOutcome::Conflict(conflict))
            }
        }
    }

    fn fail(&self, err: SyncError) -> SyncOutcome {
        let failure = SyncFailure {
            kind: err.kind(),
            message: err.to_string(),
        };
        warn!("sync round failed ({:?}): {err}", failure.kind);

        let saved = self.record().and_then(|mut record| {
            record.last_sync_error = Some(failure.message.clone());
            record.last_error_kind = Some(failure.kind);
            record.save(self.store())
        });
        if let Err(e) = saved {
            warn!("could not record sync failure: {e}");
        }

        let state = if self.pending_conflict().is_some() {
            SyncState::ConflictPending
        } else {
            SyncState::Idle
        };
        self.set_state(state);
        self.emit(SyncEvent::Failed(failure.clone()));
        SyncOutcome::Failed(failure)
    }

    /// Settles a pending conflict by pushing one side over the other.
    pub async fn resolve_conflict(&self, choice: ConflictChoice) -> SyncResult<SyncOutcome> {
        if !self.record()?.enabled {
            return Err(SyncError::NotEnabled);
        }
        let conflict = self.pending_conflict().ok_or(SyncError::NoConflict)?;
        let password = self.backup_password().ok_or(SyncError::PasswordMissing)?;
        let _guard = self.begin_round()?;
        let round = self.resolve_round(choice, conflict, &password).await;
        Ok(self.finish(round))
    }

    async fn resolve_round(
        &self,
        choice: ConflictChoice,
        conflict: SyncConflict,
        password: &str,
    ) -> SyncResult<Round> {
        if !self.vault().try_auto_unlock() {
            return Err(SyncError::Locked);
        }
        match choice {
            ConflictChoice::Local => {
                let local = self.local_snapshot()?;
                self.client.upload(&local, password).await?;
                info!("conflict resolved with local data");
                Ok(Round::Done {
                    result: SyncSuccess::ResolvedWithLocal,
                    hash: content_hash(&local)?,
                })
            }
            ConflictChoice::Cloud => {
                self.apply_remote(&conflict.cloud_data, conflict.cloud_timestamp)?;
                self.client.upload(&conflict.cloud_data, password).await?;
                info!("conflict resolved with remote data");
                Ok(Round::Done {
                    result: SyncSuccess::ResolvedWithCloud,
                    hash: content_hash(&conflict.cloud_data)?,
                })
            }
        }
    }

    // ── Enabling and passwords ─────────────────────────────────

    /// Turns sync on with `password` as the backup password and runs the
    /// first round.
    pub async fn enable_sync(self: &Arc<Self>, password: &str) -> SyncResult<SyncOutcome> {
        Self::check_backup_policy(password)?;

        let codec = *self.client.codec();
        let candidate = password.to_string();
        tokio::task::spawn_blocking(move || codec.self_test(&candidate))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))??;

        if !self.session.is_authenticated().await {
            return Err(SyncError::NotAuthenticated);
        }
        self.align_local_auth(password).await?;
        if !self.client.verify_password(password).await? {
            return Err(BackupError::WrongPassword.into());
        }

        self.set_password(Some(password));
        let mut record = self.record()?;
        record.enabled = true;
        record.save(self.store())?;
        info!("sync enabled");
        self.emit(SyncEvent::Enabled);

        let outcome = self.perform_sync().await?;
        self.start_auto_sync();
        Ok(outcome)
    }

    /// Sets up the local password from the backup password, then enables sync.
    pub async fn enable_sync_for_new_user(self: &Arc<Self>, password: &str) -> SyncResult<SyncOutcome> {
        if !self.auth.is_first_time_setup()? {
            return Err(VaultError::AlreadyInitialized.into());
        }
        self.enable_sync(password).await
    }

    /// Unlocks (or first sets up) local storage with the backup password.
    ///
    /// A differing local password is not an error; the vault stays as it was.
    async fn align_local_auth(&self, password: &str) -> SyncResult<()> {
        if self.auth.is_first_time_setup()? {
            self.auth.setup_password(password).await?;
            info!("local password set up from the backup password");
            return Ok(());
        }
        if self.vault().try_auto_unlock() {
            return Ok(());
        }
        match self.auth.unlock_with_password(password).await {
            Ok(()) => Ok(()),
            Err(VaultError::InvalidPassword) => {
                debug!("backup password differs from the local password");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stops auto-sync and forgets the backup password. The local key stays.
    pub fn disable_sync(&self) -> SyncResult<()> {
        self.stop_auto_sync();
        self.set_password(None);
        let mut record = self.record()?;
        record.enabled = false;
        record.save(self.store())?;
        self.set_conflict(None);
        self.set_state(SyncState::Idle);
        self.tracker.clear_cache();
        info!("sync disabled");
        self.emit(SyncEvent::Disabled);
        Ok(())
    }

    /// Whether `password` opens the current remote backup. True when none exists.
    pub async fn test_cloud_password(&self, password: &str) -> SyncResult<bool> {
        if !self.session.is_authenticated().await {
            return Err(SyncError::NotAuthenticated);
        }
        Ok(self.client.verify_password(password).await?)
    }

    /// Re-encrypts the remote backup under `new_password`.
    ///
    /// Not atomic: if the upload fails the backup stays under `current` and
    /// the in-memory password is unchanged.
    pub async fn change_cloud_password(&self, current: &str, new_password: &str) -> SyncResult<()> {
        if !self.record()?.enabled {
            return Err(SyncError::NotEnabled);
        }
        Self::check_backup_policy(new_password)?;
        if !self.session.is_authenticated().await {
            return Err(SyncError::NotAuthenticated);
        }
        let _guard = self.acquire()?;

        match self.client.download(current).await? {
            Some(backup) => {
                self.client
                    .upload(&backup.portfolio_data, new_password)
                    .await?;
                info!("remote backup re-encrypted under the new password");
            }
            None => debug!("no remote backup to re-encrypt"),
        }
        self.set_password(Some(new_password));
        Ok(())
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn status(&self) -> SyncResult<SyncStatus> {
        let record = self.record()?;
        Ok(SyncStatus {
            enabled: record.enabled,
            state: self.state.lock().map(|s| *s).unwrap_or_default(),
            last_sync_time: record.last_sync_time,
            last_sync_error: record.last_sync_error,
            last_error_kind: record.last_error_kind,
            has_pending_conflict: self.pending_conflict().is_some(),
            has_password: self.backup_password().is_some(),
            auto_sync_active: self.is_auto_sync_active(),
            encryption_algorithm: self.config.encryption_algorithm.clone(),
        })
    }

    pub fn pending_conflict(&self) -> Option<SyncConflict> {
        self.conflict.lock().ok().and_then(|c| c.clone())
    }

    /// Drops a pending conflict without resolving it.
    pub fn clear_conflict_state(&self) {
        self.set_conflict(None);
        if let Ok(mut state) = self.state.lock() {
            if *state == SyncState::ConflictPending {
                *state = SyncState::Idle;
            }
        }
    }

    pub fn unsynced_count(&self) -> SyncResult<UnsyncedDataCount> {
        self.tracker.unsynced_count(self.record()?.enabled)
    }

    pub fn unsynced_details(&self) -> SyncResult<Vec<UnsyncedDataDetail>> {
        self.tracker.unsynced_details(self.record()?.enabled)
    }

    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    // ── Auto-sync ──────────────────────────────────────────────

    /// Starts (or restarts) periodic sync rounds. The first round runs one
    /// full interval from now.
    pub fn start_auto_sync(self: &Arc<Self>) {
        let period = self.config.auto_sync_interval();
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(this) = weak.upgrade() else {
                    break;
                };
                this.auto_sync_round().await;
            }
            debug!("auto-sync task exiting");
        });
        if let Ok(mut slot) = self.auto_sync.lock() {
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }
        debug!("auto-sync every {}s", period.as_secs());
    }

    pub fn stop_auto_sync(&self) {
        if let Ok(mut slot) = self.auto_sync.lock() {
            if let Some(task) = slot.take() {
                task.abort();
                debug!("auto-sync stopped");
            }
        }
    }

    /// Restarts the countdown to the next automatic round, if auto-sync is on.
    pub fn reset_auto_sync_timer(self: &Arc<Self>) {
        if self.is_auto_sync_active() {
            self.start_auto_sync();
        }
    }

    pub fn is_auto_sync_active(&self) -> bool {
        self.auto_sync
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|task| !task.is_finished()))
            .unwrap_or(false)
    }

    async fn auto_sync_round(&self) {
        if !self.session.is_authenticated().await {
            debug!("auto-sync skipped, remote session signed out");
            return;
        }
        match self.perform_sync().await {
            Ok(SyncOutcome::Success(result)) => debug!("auto-sync: {result:?}"),
            Ok(SyncOutcome::Conflict(_)) => warn!("auto-sync found a conflict, waiting for the user"),
            Ok(SyncOutcome::Failed(failure)) => {
                warn!("auto-sync failed: {}", failure.message);
                self.emit(SyncEvent::AutoSyncWarning(failure));
            }
            Err(SyncError::Busy) => debug!("auto-sync skipped, a round is running"),
            Err(e) => warn!("auto-sync skipped: {e}"),
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.auto_sync.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}
