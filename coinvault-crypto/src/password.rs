//! Password verifiers.
//!
//! The stored verifier is SHA-256 over a domain tag and a PBKDF2 output, so
//! it never equals the unlocking key even when the same salt is reused.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_key, KdfParams, Salt};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const VERIFIER_DOMAIN: &[u8] = b"coinvault-password-verifier-v1";

/// Stored proof of a password. Both fields are base64.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordVerifier {
    pub hash: String,
    pub salt: String,
}

fn verifier_hash(password: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<Vec<u8>> {
    let (derived, _) = derive_key(password, Some(salt), params)?;
    let mut hasher = Sha256::new();
    hasher.update(VERIFIER_DOMAIN);
    hasher.update(derived.as_bytes());
    Ok(hasher.finalize().to_vec())
}

/// Hashes `password` for storage. A random salt is used when `salt` is `None`.
pub fn hash_password(
    password: &str,
    salt: Option<&Salt>,
    params: &KdfParams,
) -> CryptoResult<PasswordVerifier> {
    let salt = salt.copied().unwrap_or_else(Salt::random);
    let hash = verifier_hash(password, &salt, params)?;
    Ok(PasswordVerifier {
        hash: STANDARD.encode(hash),
        salt: salt.to_base64(),
    })
}

/// Checks `password` against a stored verifier in constant time.
pub fn verify_password(
    password: &str,
    verifier: &PasswordVerifier,
    params: &KdfParams,
) -> CryptoResult<bool> {
    if password.is_empty() {
        return Ok(false);
    }
    let salt = Salt::from_base64(&verifier.salt)?;
    let expected = STANDARD
        .decode(&verifier.hash)
        .map_err(|e| CryptoError::InvalidPayload(format!("verifier is not base64: {e}")))?;
    let actual = verifier_hash(password, &salt, params)?;

    // Slices of unequal length compare unequal.
    Ok(expected.as_slice().ct_eq(actual.as_slice()).into())
}
