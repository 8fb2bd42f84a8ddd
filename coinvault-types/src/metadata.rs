use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of entity the change tracker follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Holding,
    Location,
    Token,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Holding, EntityKind::Location, EntityKind::Token];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Holding => "holding",
            EntityKind::Location => "location",
            EntityKind::Token => "token",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync state of a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub is_new: bool,
    pub is_modified: bool,
    pub is_deleted: bool,
    pub is_synced: bool,
    pub last_modified: DateTime<Utc>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub version: u64,
    /// Set when the entity was created while sync was turned off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_disabled: Option<bool>,
}

/// What a pending change will do to the remote snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Created,
    Updated,
    Deleted,
}

impl SyncAction {
    /// Sort priority when two details share a timestamp. Deletions first.
    pub fn priority(&self) -> u8 {
        match self {
            SyncAction::Deleted => 0,
            SyncAction::Created => 1,
            SyncAction::Updated => 2,
        }
    }
}

/// Aggregate count of entities not yet reflected remotely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsyncedDataCount {
    pub holdings: usize,
    pub locations: usize,
    pub tokens: usize,
    pub total: usize,
}

impl UnsyncedDataCount {
    pub fn add(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Holding => self.holdings += 1,
            EntityKind::Location => self.locations += 1,
            EntityKind::Token => self.tokens += 1,
        }
        self.total += 1;
    }
}

/// One pending change, for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsyncedDataDetail {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    pub action: SyncAction,
    pub last_modified: DateTime<Utc>,
}
