//! Encryption layer for CoinVault.
//!
//! Provides field-level encryption using:
//! - PBKDF2-HMAC-SHA256 for deriving the local unlocking key from a password
//! - ChaCha20-Poly1305 for authenticated encryption with a fresh nonce per call
//! - A separate verifier derivation so the stored password check never equals the key
//! - Argon2id for the remote-backup key domain
//!
//! # Key domains
//!
//! The local unlocking key and the remote backup key are derived by different
//! functions from possibly different passwords. Either can be reset without
//! touching the other.

mod cipher;
mod error;
mod key;
mod password;
mod policy;

pub use cipher::{
    decrypt, decrypt_string, encrypt, encrypt_detached, encrypt_string, EncryptedPayload,
    NONCE_SIZE, PAYLOAD_VERSION, TAG_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{
    derive_backup_key, derive_key, generate_random_key, BackupKdfParams, DerivedKey, KdfParams,
    Salt, DEFAULT_PBKDF2_ITERATIONS, KEY_SIZE, SALT_SIZE,
};
pub use password::{hash_password, verify_password, PasswordVerifier};
pub use policy::{password_strength, PasswordPolicy, PasswordRule};
