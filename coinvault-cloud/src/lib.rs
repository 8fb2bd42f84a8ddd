//! Encrypted remote backup for CoinVault.
//!
//! Provides the pieces the sync coordinator talks to the remote host with:
//! - [`BackupCodec`]: snapshot + checksum, encrypted under a password-derived key
//! - [`RemoteStore`]: one named file inside a dedicated folder on the remote host
//! - [`BackupClient`]: size limits and bounded retry around the store
//! - [`SyncConfig`]: the injected tuning constants

pub mod backup;
pub mod client;
pub mod config;
pub mod error;
pub mod remote;
pub mod retry;

pub use backup::{BackupCodec, BackupError, BackupResult, CloudBackup, BACKUP_VERSION};
pub use client::BackupClient;
pub use config::SyncConfig;
pub use error::{CloudError, CloudResult};
pub use remote::{
    FolderRemoteStore, ManualSession, MemoryRemoteStore, RemoteFile, RemoteSession, RemoteStore,
};
pub use retry::{with_retry, RetryPolicy};
