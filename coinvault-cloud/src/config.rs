//! Sync configuration.

use crate::error::{CloudError, CloudResult};
use crate::retry::RetryPolicy;
use coinvault_crypto::BackupKdfParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning constants for remote backup and the sync coordinator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Retries after the first attempt of a remote operation.
    pub retry_attempts: u32,

    /// Base delay for exponential backoff (milliseconds).
    pub retry_delay_ms: u64,

    /// Local and remote edits closer than this are reported as near-simultaneous (seconds).
    pub conflict_check_interval_secs: u64,

    /// Interval between automatic sync rounds (seconds).
    pub auto_sync_interval_secs: u64,

    /// Largest encrypted backup accepted for upload (bytes).
    pub max_backup_size: usize,

    /// Label reported to clients for the backup cipher.
    pub encryption_algorithm: String,

    /// Folder on the remote host holding the backup.
    pub app_folder: String,

    /// Name of the backup file inside `app_folder`.
    pub backup_file_name: String,

    /// Key derivation cost for the backup password.
    pub backup_kdf: BackupKdfParams,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay_ms: 2_000,
            conflict_check_interval_secs: 30,
            auto_sync_interval_secs: 300, // 5 minutes
            max_backup_size: 10 * 1024 * 1024,
            encryption_algorithm: "ChaCha20-Poly1305".to_string(),
            app_folder: "CryptoPortfolioApp".to_string(),
            backup_file_name: "portfolio-backup.json".to_string(),
            backup_kdf: BackupKdfParams::default(),
        }
    }
}

impl SyncConfig {
    /// Parses a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> CloudResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CloudResult<()> {
        if self.auto_sync_interval_secs == 0 {
            return Err(CloudError::Config(
                "auto_sync_interval_secs must be positive".to_string(),
            ));
        }
        if self.retry_attempts > 10 {
            return Err(CloudError::Config(format!(
                "retry_attempts {} exceeds 10",
                self.retry_attempts
            )));
        }
        if self.max_backup_size == 0 {
            return Err(CloudError::Config("max_backup_size must be positive".to_string()));
        }
        if self.app_folder.trim().is_empty() || self.backup_file_name.trim().is_empty() {
            return Err(CloudError::Config(
                "app_folder and backup_file_name must be set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.auto_sync_interval_secs)
    }

    pub fn conflict_check_interval(&self) -> Duration {
        Duration::from_secs(self.conflict_check_interval_secs)
    }
}
