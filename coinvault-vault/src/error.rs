use coinvault_crypto::CryptoError;
use coinvault_storage::StorageError;
use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault is locked")]
    Locked,

    #[error("vault not initialized")]
    NotInitialized,

    #[error("vault already initialized")]
    AlreadyInitialized,

    #[error("invalid password")]
    InvalidPassword,

    #[error("password too weak: {0}")]
    WeakPassword(String),

    /// A stored field does not decrypt under the active key.
    #[error("holding {0} was encrypted with a different key")]
    KeyMismatch(String),

    #[error("holding not found: {0}")]
    HoldingNotFound(String),

    #[error("invalid holding: {0}")]
    InvalidHolding(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),
}
