//! Whole-snapshot encryption for the remote backup file.
//!
//! The plaintext is a [`CloudBackup`]: the portfolio plus a SHA-256 checksum
//! of its JSON. The key comes from the backup password through Argon2id,
//! with the salt stored in the payload. This domain is independent of the
//! local unlocking key.

use coinvault_crypto::{
    decrypt, derive_backup_key, encrypt_detached, BackupKdfParams, CryptoError, EncryptedPayload,
    Salt,
};
use coinvault_types::{now_millis, PortfolioSnapshot};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const BACKUP_VERSION: &str = "1.0";

pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug, Error)]
pub enum BackupError {
    /// The payload did not decrypt or did not parse under this password.
    #[error("wrong backup password")]
    WrongPassword,

    /// Decrypted fine, but the content does not match its checksum.
    #[error("backup checksum mismatch")]
    IntegrityFailure,

    #[error("backup encryption failed: {0}")]
    Encryption(String),

    #[error("malformed backup payload: {0}")]
    Malformed(String),
}

/// The decrypted content of a remote backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudBackup {
    pub portfolio_data: PortfolioSnapshot,
    /// Epoch milliseconds at upload.
    pub timestamp: i64,
    pub version: String,
    /// SHA-256 hex of the JSON of `portfolio_data`.
    pub checksum: String,
}

impl CloudBackup {
    pub fn new(portfolio_data: PortfolioSnapshot, timestamp: i64) -> BackupResult<Self> {
        let checksum = Self::compute_checksum(&portfolio_data)?;
        Ok(Self {
            portfolio_data,
            timestamp,
            version: BACKUP_VERSION.to_string(),
            checksum,
        })
    }

    pub fn compute_checksum(data: &PortfolioSnapshot) -> BackupResult<String> {
        let json = serde_json::to_vec(data).map_err(|e| BackupError::Encryption(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(&json)))
    }

    pub fn verify_checksum(&self) -> BackupResult<()> {
        if Self::compute_checksum(&self.portfolio_data)? == self.checksum {
            Ok(())
        } else {
            Err(BackupError::IntegrityFailure)
        }
    }
}

/// Encrypts and decrypts [`CloudBackup`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackupCodec {
    params: BackupKdfParams,
}

impl BackupCodec {
    pub fn new(params: BackupKdfParams) -> Self {
        Self { params }
    }

    /// Wraps `data` with a timestamp and checksum and encrypts it.
    pub fn encrypt_portfolio_data(
        &self,
        data: &PortfolioSnapshot,
        password: &str,
    ) -> BackupResult<EncryptedPayload> {
        let backup = CloudBackup::new(data.clone(), now_millis())?;
        self.encrypt_backup(&backup, password)
    }

    /// Encrypts an already-assembled backup as is.
    pub fn encrypt_backup(&self, backup: &CloudBackup, password: &str) -> BackupResult<EncryptedPayload> {
        let plaintext =
            serde_json::to_vec(backup).map_err(|e| BackupError::Encryption(e.to_string()))?;
        let salt = Salt::random();
        let key = derive_backup_key(password, &salt, &self.params)
            .map_err(|e| BackupError::Encryption(e.to_string()))?;
        encrypt_detached(&key, &plaintext, &salt).map_err(|e| BackupError::Encryption(e.to_string()))
    }

    /// Decrypts a payload and checks its checksum.
    pub fn decrypt_portfolio_data(
        &self,
        payload: &EncryptedPayload,
        password: &str,
    ) -> BackupResult<CloudBackup> {
        let salt = payload
            .salt()
            .map_err(|e| BackupError::Malformed(e.to_string()))?
            .ok_or_else(|| BackupError::Malformed("payload has no salt".to_string()))?;
        let key = derive_backup_key(password, &salt, &self.params)
            .map_err(|e| BackupError::Malformed(e.to_string()))?;

        let plaintext = decrypt(&key, payload).map_err(|e| match e {
            CryptoError::Decryption(_) => BackupError::WrongPassword,
            other => BackupError::Malformed(other.to_string()),
        })?;
        let backup: CloudBackup =
            serde_json::from_slice(&plaintext).map_err(|_| BackupError::WrongPassword)?;
        backup.verify_checksum()?;
        Ok(backup)
    }

    /// Whether `password` opens `payload`. Integrity failures still surface as errors.
    pub fn verify_password(&self, payload: &EncryptedPayload, password: &str) -> BackupResult<bool> {
        match self.decrypt_portfolio_data(payload, password) {
            Ok(_) => Ok(true),
            Err(BackupError::WrongPassword) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Round-trips an empty snapshot to prove the password and parameters work.
    pub fn self_test(&self, password: &str) -> BackupResult<()> {
        let data = PortfolioSnapshot::default();
        let payload = self.encrypt_portfolio_data(&data, password)?;
        let back = self.decrypt_portfolio_data(&payload, password)?;
        if back.portfolio_data != data {
            return Err(BackupError::IntegrityFailure);
        }
        Ok(())
    }

    /// Whether `json` has the shape of an encrypted backup payload.
    pub fn is_encrypted_payload(json: &str) -> bool {
        serde_json::from_str::<EncryptedPayload>(json)
            .map(|p| p.salt.is_some() && p.tag.is_some())
            .unwrap_or(false)
    }
}
