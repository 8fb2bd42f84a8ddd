//! Local password setup and unlock.

use crate::error::{VaultError, VaultResult};
use crate::key_cache::KeyCache;
use crate::vault::EncryptedVault;
use coinvault_crypto::{
    derive_key, hash_password, verify_password, DerivedKey, KdfParams, PasswordPolicy,
    PasswordVerifier, Salt,
};
use coinvault_storage::{tables, TableStore, TableStoreExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const AUTH_STATE_KEY: &str = "auth_state";

/// Persisted record of the unlocking password. Holds no key material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub is_authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    /// Salt of the password verifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    /// Salt the unlocking key is derived with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_salt: Option<String>,
}

impl AuthState {
    fn verifier(&self) -> Option<PasswordVerifier> {
        Some(PasswordVerifier {
            hash: self.password_hash.clone()?,
            salt: self.salt.clone()?,
        })
    }
}

struct Credentials {
    verifier: PasswordVerifier,
    key: DerivedKey,
    key_salt: Salt,
}

/// Runs the CPU-heavy derivations off the async executor.
async fn derive_credentials(password: String, params: KdfParams) -> VaultResult<Credentials> {
    tokio::task::spawn_blocking(move || -> VaultResult<Credentials> {
        let verifier = hash_password(&password, None, &params)?;
        let (key, key_salt) = derive_key(&password, None, &params)?;
        Ok(Credentials {
            verifier,
            key,
            key_salt,
        })
    })
    .await
    .map_err(|e| VaultError::Task(e.to_string()))?
}

/// Sets up, verifies and changes the local unlocking password, handing the
/// derived key to the vault.
pub struct AuthService {
    store: Arc<dyn TableStore>,
    vault: Arc<EncryptedVault>,
    params: KdfParams,
    policy: PasswordPolicy,
}

impl AuthService {
    pub fn new(vault: Arc<EncryptedVault>, params: KdfParams) -> Self {
        Self {
            store: Arc::clone(vault.store()),
            vault,
            params,
            policy: PasswordPolicy::local(),
        }
    }

    pub fn with_policy(mut self, policy: PasswordPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn vault(&self) -> &Arc<EncryptedVault> {
        &self.vault
    }

    pub fn auth_state(&self) -> VaultResult<AuthState> {
        Ok(self
            .store
            .get_json::<AuthState>(tables::SETTINGS, AUTH_STATE_KEY)?
            .unwrap_or_default())
    }

    fn save_state(&self, state: &AuthState) -> VaultResult<()> {
        self.store.put_json(tables::SETTINGS, AUTH_STATE_KEY, state)?;
        Ok(())
    }

    fn key_cache(&self) -> &Arc<dyn KeyCache> {
        self.vault.key_cache()
    }

    fn check_policy(&self, password: &str) -> VaultResult<()> {
        let violations = self.policy.violations(password);
        if violations.is_empty() {
            return Ok(());
        }
        let reasons: Vec<String> = violations.iter().map(ToString::to_string).collect();
        Err(VaultError::WeakPassword(reasons.join(", ")))
    }

    pub fn is_first_time_setup(&self) -> VaultResult<bool> {
        Ok(self.auth_state()?.password_hash.is_none())
    }

    /// Whether a password has been accepted and the vault holds a key.
    pub fn is_authenticated(&self) -> bool {
        self.vault.is_unlocked()
            && self
                .auth_state()
                .map(|state| state.is_authenticated)
                .unwrap_or(false)
    }

    /// First-time setup. Leaves the vault unlocked.
    pub async fn setup_password(&self, password: &str) -> VaultResult<()> {
        if !self.is_first_time_setup()? {
            return Err(VaultError::AlreadyInitialized);
        }
        self.check_policy(password)?;

        let creds = derive_credentials(password.to_string(), self.params).await?;
        self.save_state(&AuthState {
            is_authenticated: true,
            password_hash: Some(creds.verifier.hash),
            salt: Some(creds.verifier.salt),
            key_salt: Some(creds.key_salt.to_base64()),
        })?;
        self.key_cache().store(&creds.key);
        self.vault.set_key(creds.key);
        info!("local password configured");
        Ok(())
    }

    /// Checks `password` against the stored verifier without unlocking.
    pub async fn verify_password(&self, password: &str) -> VaultResult<bool> {
        let verifier = self
            .auth_state()?
            .verifier()
            .ok_or(VaultError::NotInitialized)?;
        let password = password.to_string();
        let params = self.params;
        tokio::task::spawn_blocking(move || verify_password(&password, &verifier, &params))
            .await
            .map_err(|e| VaultError::Task(e.to_string()))?
            .map_err(Into::into)
    }

    /// Derives the key from `password` and installs it in the vault.
    pub async fn unlock_with_password(&self, password: &str) -> VaultResult<()> {
        let mut state = self.auth_state()?;
        let key_salt = state.key_salt.clone().ok_or(VaultError::NotInitialized)?;
        if !self.verify_password(password).await? {
            warn!("unlock rejected: wrong password");
            return Err(VaultError::InvalidPassword);
        }

        let salt = Salt::from_base64(&key_salt)?;
        let password = password.to_string();
        let params = self.params;
        let (key, _) = tokio::task::spawn_blocking(move || derive_key(&password, Some(&salt), &params))
            .await
            .map_err(|e| VaultError::Task(e.to_string()))??;

        state.is_authenticated = true;
        self.save_state(&state)?;
        self.key_cache().store(&key);
        self.vault.set_key(key);
        info!("vault unlocked");
        Ok(())
    }

    /// Re-encrypts every holding under a key derived from `new_password`.
    ///
    /// Returns the number of holdings re-encrypted.
    pub async fn change_password(&self, current: &str, new_password: &str) -> VaultResult<usize> {
        if !self.verify_password(current).await? {
            return Err(VaultError::InvalidPassword);
        }
        self.check_policy(new_password)?;
        if !self.vault.try_auto_unlock() {
            self.unlock_with_password(current).await?;
        }

        let creds = derive_credentials(new_password.to_string(), self.params).await?;
        let count = self.vault.reencrypt_all(creds.key.clone())?;
        self.key_cache().store(&creds.key);
        self.save_state(&AuthState {
            is_authenticated: true,
            password_hash: Some(creds.verifier.hash),
            salt: Some(creds.verifier.salt),
            key_salt: Some(creds.key_salt.to_base64()),
        })?;
        info!("local password changed");
        Ok(count)
    }

    /// Locks the vault and marks the session unauthenticated.
    pub fn logout(&self) -> VaultResult<()> {
        self.vault.lock();
        let mut state = self.auth_state()?;
        if state.is_authenticated {
            state.is_authenticated = false;
            self.save_state(&state)?;
        }
        info!("logged out");
        Ok(())
    }

    /// Forgets the password entirely. Encrypted rows are left in place.
    pub fn reset_auth_data(&self) -> VaultResult<()> {
        self.vault.lock();
        self.store.delete(tables::SETTINGS, AUTH_STATE_KEY)?;
        warn!("local auth data reset");
        Ok(())
    }
}
