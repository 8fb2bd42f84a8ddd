//! Sync error types and the user-facing failure taxonomy.

use coinvault_cloud::{BackupError, CloudError};
use coinvault_storage::StorageError;
use coinvault_vault::VaultError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Coarse classification of a sync failure, for display and for deciding
/// whether a retry by the user can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthFailure,
    NetworkFailure,
    QuotaExceeded,
    RateLimited,
    EncryptionFailure,
    WrongPassword,
    KeyMismatch,
    IntegrityFailure,
    LockedStorage,
    /// A sync round was already running.
    Busy,
    /// The operation is not valid in the current sync state.
    Precondition,
    Storage,
}

impl ErrorKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::AuthFailure => "Sign in to your cloud account again to continue syncing.",
            ErrorKind::NetworkFailure => "Could not reach the cloud. Check your connection and try again.",
            ErrorKind::QuotaExceeded => "Your cloud storage is full or the backup is too large.",
            ErrorKind::RateLimited => "The cloud is busy. Sync will try again shortly.",
            ErrorKind::EncryptionFailure => "The backup could not be encrypted or decrypted.",
            ErrorKind::WrongPassword => "The backup password is incorrect.",
            ErrorKind::KeyMismatch => {
                "Local data was encrypted with a different password and cannot be read."
            }
            ErrorKind::IntegrityFailure => "The cloud backup is corrupted.",
            ErrorKind::LockedStorage => "Unlock the app to sync.",
            ErrorKind::Busy => "A sync is already in progress.",
            ErrorKind::Precondition => "Sync is not set up.",
            ErrorKind::Storage => "Local storage could not be read or written.",
        }
    }

    /// Whether trying again later without user action may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkFailure | ErrorKind::RateLimited | ErrorKind::Busy
        )
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync already in progress")]
    Busy,

    #[error("sync is not enabled")]
    NotEnabled,

    #[error("no backup password configured")]
    PasswordMissing,

    #[error("local storage is locked")]
    Locked,

    #[error("remote session is not authenticated")]
    NotAuthenticated,

    #[error("weak backup password: {0}")]
    WeakPassword(String),

    #[error("no conflict pending")]
    NoConflict,

    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

fn backup_kind(err: &BackupError) -> ErrorKind {
    match err {
        BackupError::WrongPassword => ErrorKind::WrongPassword,
        BackupError::IntegrityFailure => ErrorKind::IntegrityFailure,
        BackupError::Encryption(_) | BackupError::Malformed(_) => ErrorKind::EncryptionFailure,
    }
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Busy => ErrorKind::Busy,
            SyncError::NotEnabled | SyncError::PasswordMissing | SyncError::NoConflict => {
                ErrorKind::Precondition
            }
            SyncError::WeakPassword(_) => ErrorKind::Precondition,
            SyncError::Locked => ErrorKind::LockedStorage,
            SyncError::NotAuthenticated => ErrorKind::AuthFailure,
            SyncError::Vault(e) => match e {
                VaultError::Locked | VaultError::NotInitialized => ErrorKind::LockedStorage,
                VaultError::KeyMismatch(_) => ErrorKind::KeyMismatch,
                VaultError::InvalidPassword => ErrorKind::AuthFailure,
                VaultError::Crypto(_) => ErrorKind::EncryptionFailure,
                _ => ErrorKind::Storage,
            },
            SyncError::Cloud(e) => match e {
                CloudError::Network(_) | CloudError::Io(_) | CloudError::NotFound(_) => {
                    ErrorKind::NetworkFailure
                }
                CloudError::RateLimited => ErrorKind::RateLimited,
                CloudError::QuotaExceeded { .. } | CloudError::PayloadTooLarge { .. } => {
                    ErrorKind::QuotaExceeded
                }
                CloudError::AuthRequired | CloudError::AuthFailed(_) => ErrorKind::AuthFailure,
                CloudError::Backup(b) => backup_kind(b),
                CloudError::Serialization(_) => ErrorKind::EncryptionFailure,
                CloudError::Config(_) => ErrorKind::Precondition,
                CloudError::Task(_) => ErrorKind::Storage,
            },
            SyncError::Backup(e) => backup_kind(e),
            SyncError::Storage(_) | SyncError::Serialization(_) | SyncError::Task(_) => {
                ErrorKind::Storage
            }
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}
