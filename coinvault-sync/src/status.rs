//! Sync outcomes, events and the persisted sync record.

use crate::error::{ErrorKind, SyncResult};
use coinvault_storage::{tables, TableStore, TableStoreExt};
use coinvault_types::PortfolioSnapshot;
use serde::{Deserialize, Serialize};

const SYNC_RECORD_KEY: &str = "sync_record";

/// Coordinator state. A round moves `Idle → Syncing` and back to `Idle`,
/// or stops at `ConflictPending` until the conflict is resolved or cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    ConflictPending,
}

/// How a successful round reconciled the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSuccess {
    /// No remote backup existed; local data was uploaded.
    InitialUpload,
    /// Both sides already had the same content.
    AlreadyInSync,
    /// Local changes were pushed over the remote backup.
    PushedLocal,
    /// The newer remote backup replaced local data.
    AppliedRemote,
    /// A conflict was resolved by keeping local data.
    ResolvedWithLocal,
    /// A conflict was resolved by keeping the remote backup.
    ResolvedWithCloud,
}

/// Local and remote both changed since the last reconciled snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub local_data: PortfolioSnapshot,
    pub cloud_data: PortfolioSnapshot,
    /// Last local modification (epoch ms), if known.
    pub local_timestamp: Option<i64>,
    /// Upload time of the remote backup (epoch ms).
    pub cloud_timestamp: i64,
    /// The two edits happened within the conflict-check interval.
    pub timestamps_close: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of one sync attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Success(SyncSuccess),
    Conflict(SyncConflict),
    Failed(SyncFailure),
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success(_))
    }
}

/// Which side wins a pending conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictChoice {
    Local,
    Cloud,
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Started,
    Completed { result: SyncSuccess, at: i64 },
    ConflictDetected { local_timestamp: Option<i64>, cloud_timestamp: i64 },
    Failed(SyncFailure),
    /// An automatic round failed. Auto-sync keeps running.
    AutoSyncWarning(SyncFailure),
    Enabled,
    Disabled,
}

/// What survives a restart. The backup password is never part of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub enabled: bool,
    #[serde(default)]
    pub last_sync_time: Option<i64>,
    #[serde(default)]
    pub last_sync_error: Option<String>,
    #[serde(default)]
    pub last_error_kind: Option<ErrorKind>,
    /// Content hash of the last snapshot both sides agreed on.
    #[serde(default)]
    pub baseline_hash: Option<String>,
}

impl SyncRecord {
    pub fn load(store: &dyn TableStore) -> SyncResult<Self> {
        Ok(store
            .get_json::<SyncRecord>(tables::SETTINGS, SYNC_RECORD_KEY)?
            .unwrap_or_default())
    }

    pub fn save(&self, store: &dyn TableStore) -> SyncResult<()> {
        store.put_json(tables::SETTINGS, SYNC_RECORD_KEY, self)?;
        Ok(())
    }
}

/// Snapshot of the coordinator for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub enabled: bool,
    pub state: SyncState,
    pub last_sync_time: Option<i64>,
    pub last_sync_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,
    pub has_pending_conflict: bool,
    pub has_password: bool,
    pub auto_sync_active: bool,
    pub encryption_algorithm: String,
}
