use crate::backup::{BackupCodec, CloudBackup};
use crate::config::SyncConfig;
use crate::error::{CloudError, CloudResult};
use crate::remote::RemoteStore;
use crate::retry::{with_retry, RetryPolicy};
use coinvault_crypto::EncryptedPayload;
use coinvault_types::{now_millis, PortfolioSnapshot};
use std::sync::Arc;
use tracing::{debug, info};

/// Reads and writes the single encrypted backup file.
///
/// Network calls are retried per the configured policy. Encryption runs on
/// the blocking pool; the backup key derivation is CPU-bound.
pub struct BackupClient {
    store: Arc<dyn RemoteStore>,
    codec: BackupCodec,
    retry: RetryPolicy,
    folder: String,
    file_name: String,
    max_size: usize,
}

impl BackupClient {
    pub fn new(store: Arc<dyn RemoteStore>, config: &SyncConfig) -> Self {
        Self {
            store,
            codec: BackupCodec::new(config.backup_kdf),
            retry: config.retry_policy(),
            folder: config.app_folder.clone(),
            file_name: config.backup_file_name.clone(),
            max_size: config.max_backup_size,
        }
    }

    pub fn codec(&self) -> &BackupCodec {
        &self.codec
    }

    pub async fn backup_exists(&self) -> CloudResult<bool> {
        let found = with_retry(&self.retry, || {
            self.store.find_file(&self.folder, &self.file_name)
        })
        .await?;
        Ok(found.is_some())
    }

    /// Fetches the raw payload, or `None` if no backup exists yet.
    pub async fn download_payload(&self) -> CloudResult<Option<EncryptedPayload>> {
        let Some(file) = with_retry(&self.retry, || {
            self.store.find_file(&self.folder, &self.file_name)
        })
        .await?
        else {
            return Ok(None);
        };
        let body = with_retry(&self.retry, || self.store.download(&file)).await?;
        debug!("downloaded backup ({} bytes)", body.len());
        Ok(Some(serde_json::from_slice(&body)?))
    }

    /// Downloads and decrypts the backup, or `None` if none exists yet.
    pub async fn download(&self, password: &str) -> CloudResult<Option<CloudBackup>> {
        let Some(payload) = self.download_payload().await? else {
            return Ok(None);
        };
        let codec = self.codec;
        let password = password.to_string();
        let backup = tokio::task::spawn_blocking(move || {
            codec.decrypt_portfolio_data(&payload, &password)
        })
        .await
        .map_err(|e| CloudError::Task(e.to_string()))??;
        Ok(Some(backup))
    }

    /// Encrypts `data` under `password` and replaces the remote backup.
    ///
    /// Returns the backup as written, including its timestamp and checksum.
    pub async fn upload(&self, data: &PortfolioSnapshot, password: &str) -> CloudResult<CloudBackup> {
        let backup = CloudBackup::new(data.clone(), now_millis())?;
        let codec = self.codec;
        let password = password.to_string();
        let to_seal = backup.clone();
        let payload = tokio::task::spawn_blocking(move || codec.encrypt_backup(&to_seal, &password))
            .await
            .map_err(|e| CloudError::Task(e.to_string()))??;

        let body = serde_json::to_vec(&payload)?;
        if body.len() > self.max_size {
            return Err(CloudError::PayloadTooLarge {
                size: body.len(),
                max: self.max_size,
            });
        }

        let size = body.len();
        with_retry(&self.retry, || {
            self.store.upload(&self.folder, &self.file_name, body.clone())
        })
        .await?;
        info!(
            "uploaded backup: {} holdings, {size} bytes",
            backup.portfolio_data.holdings.len()
        );
        Ok(backup)
    }

    /// Whether `password` opens the current backup. True when no backup exists.
    pub async fn verify_password(&self, password: &str) -> CloudResult<bool> {
        let Some(payload) = self.download_payload().await? else {
            return Ok(true);
        };
        let codec = self.codec;
        let password = password.to_string();
        let ok = tokio::task::spawn_blocking(move || codec.verify_password(&payload, &password))
            .await
            .map_err(|e| CloudError::Task(e.to_string()))??;
        Ok(ok)
    }

    /// Removes the remote backup. Returns whether one existed.
    pub async fn delete_backup(&self) -> CloudResult<bool> {
        let Some(file) = self.store.find_file(&self.folder, &self.file_name).await? else {
            return Ok(false);
        };
        with_retry(&self.retry, || self.store.delete(&file)).await?;
        info!("deleted remote backup");
        Ok(true)
    }
}
