//! Remote backup error types.

use crate::backup::BackupError;
use thiserror::Error;

/// Result type for remote backup operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur talking to the remote host.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by remote host")]
    RateLimited,

    #[error("storage quota exceeded: used {used} of {quota} bytes")]
    QuotaExceeded { used: u64, quota: u64 },

    #[error("backup too large: {size} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl CloudError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CloudError::Network(_) | CloudError::RateLimited | CloudError::Io(_)
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CloudError::RateLimited)
    }
}
