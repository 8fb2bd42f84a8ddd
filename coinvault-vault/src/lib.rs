//! Encrypted holdings vault.
//!
//! Holdings are stored with quantity, location and note each encrypted
//! independently under the active key. Symbol and timestamps stay in clear
//! so rows can be listed without unlocking.
//!
//! The active key lives only in memory. It is installed by [`AuthService`]
//! after a password unlock and removed by [`EncryptedVault::lock`] or the
//! [`SessionGuard`] idle timeout.

mod auth;
mod catalog;
mod error;
mod key_cache;
mod session;
mod settings;
mod vault;

pub use auth::{AuthService, AuthState};
pub use catalog::Catalog;
pub use error::{VaultError, VaultResult};
pub use key_cache::{KeyCache, MemoryKeyCache, NoKeyCache};
pub use session::{SessionConfig, SessionEvent, SessionGuard};
pub use settings::{last_data_modified, record_data_modified};
pub use vault::{EncryptedHolding, EncryptedVault};
