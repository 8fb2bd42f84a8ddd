//! Pure transitions and classification of per-entity sync metadata.

use chrono::{DateTime, Utc};
use coinvault_types::{SyncAction, SyncMetadata};

/// Metadata for an entity created just now.
pub fn create_default_metadata(now: DateTime<Utc>) -> SyncMetadata {
    SyncMetadata {
        is_new: true,
        is_modified: false,
        is_deleted: false,
        is_synced: false,
        last_modified: now,
        last_sync_time: None,
        version: 1,
        sync_disabled: None,
    }
}

pub fn mark_as_modified(meta: SyncMetadata, now: DateTime<Utc>) -> SyncMetadata {
    SyncMetadata {
        is_modified: true,
        is_synced: false,
        last_modified: now,
        version: meta.version + 1,
        ..meta
    }
}

pub fn mark_as_deleted(meta: SyncMetadata, now: DateTime<Utc>) -> SyncMetadata {
    SyncMetadata {
        is_deleted: true,
        is_synced: false,
        last_modified: now,
        version: meta.version + 1,
        ..meta
    }
}

/// Clears the pending flags and the sync-disabled marker.
pub fn mark_as_synced(meta: SyncMetadata, now: DateTime<Utc>) -> SyncMetadata {
    SyncMetadata {
        is_new: false,
        is_modified: false,
        is_synced: true,
        last_sync_time: Some(now),
        sync_disabled: None,
        ..meta
    }
}

/// Whether an entity still has changes the remote snapshot lacks.
///
/// Rules apply in order; the first that matches decides.
pub fn is_unsynced_data(
    meta: &SyncMetadata,
    watermark: Option<DateTime<Utc>>,
    sync_enabled: bool,
) -> bool {
    if meta.is_deleted && !meta.is_synced {
        return true;
    }
    if meta.is_new && !meta.is_synced {
        return true;
    }
    if meta.is_modified && !meta.is_synced {
        return true;
    }
    if meta.is_synced && meta.last_sync_time.is_some() {
        return false;
    }
    if meta.sync_disabled == Some(true) {
        return if sync_enabled { !meta.is_synced } else { true };
    }
    if meta.last_sync_time.is_none() {
        let covered = watermark.is_some_and(|w| meta.last_modified <= w);
        return !covered;
    }
    if let Some(w) = watermark {
        if meta.last_modified > w {
            return true;
        }
    }
    false
}

/// How a pending change is labeled for display.
pub fn action_for(meta: &SyncMetadata) -> SyncAction {
    if meta.is_deleted {
        SyncAction::Deleted
    } else if meta.is_new {
        SyncAction::Created
    } else {
        SyncAction::Updated
    }
}
