//! ChaCha20-Poly1305 authenticated encryption.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{DerivedKey, Salt};
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;
pub const PAYLOAD_VERSION: &str = "1.0";

fn default_version() -> String {
    PAYLOAD_VERSION.to_string()
}

/// Wire format of an encrypted blob. All binary fields are base64.
///
/// Field-level encryption leaves `salt` and `tag` empty and keeps the tag
/// appended to the ciphertext. Whole-snapshot encryption carries the salt
/// its key was derived from and a detached tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub ciphertext: String,
    pub iv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
}

impl EncryptedPayload {
    /// The embedded key-derivation salt, if any.
    pub fn salt(&self) -> CryptoResult<Option<Salt>> {
        self.salt.as_deref().map(Salt::from_base64).transpose()
    }
}

fn cipher_for(key: &DerivedKey) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

fn seal(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<([u8; NONCE_SIZE], Vec<u8>)> {
    let nonce = random_nonce();
    let sealed = cipher_for(key)
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    Ok((nonce, sealed))
}

/// Encrypts `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<EncryptedPayload> {
    let (nonce, sealed) = seal(key, plaintext)?;
    Ok(EncryptedPayload {
        ciphertext: STANDARD.encode(sealed),
        iv: STANDARD.encode(nonce),
        salt: None,
        tag: None,
        version: default_version(),
    })
}

/// Encrypts with a detached tag and records the salt `key` was derived from.
pub fn encrypt_detached(
    key: &DerivedKey,
    plaintext: &[u8],
    salt: &Salt,
) -> CryptoResult<EncryptedPayload> {
    let (nonce, mut sealed) = seal(key, plaintext)?;
    let tag = sealed.split_off(sealed.len() - TAG_SIZE);
    Ok(EncryptedPayload {
        ciphertext: STANDARD.encode(sealed),
        iv: STANDARD.encode(nonce),
        salt: Some(salt.to_base64()),
        tag: Some(STANDARD.encode(tag)),
        version: default_version(),
    })
}

/// Decrypts a payload produced by [`encrypt`] or [`encrypt_detached`].
///
/// Fails without distinguishing a wrong key from tampered data.
pub fn decrypt(key: &DerivedKey, payload: &EncryptedPayload) -> CryptoResult<Vec<u8>> {
    if payload.version != PAYLOAD_VERSION {
        return Err(CryptoError::UnsupportedVersion(payload.version.clone()));
    }

    let nonce = STANDARD
        .decode(&payload.iv)
        .map_err(|e| CryptoError::InvalidPayload(format!("iv is not base64: {e}")))?;
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidPayload(format!(
            "iv must be {NONCE_SIZE} bytes, got {}",
            nonce.len()
        )));
    }

    let mut sealed = STANDARD
        .decode(&payload.ciphertext)
        .map_err(|e| CryptoError::InvalidPayload(format!("ciphertext is not base64: {e}")))?;
    if let Some(tag) = &payload.tag {
        let tag = STANDARD
            .decode(tag)
            .map_err(|e| CryptoError::InvalidPayload(format!("tag is not base64: {e}")))?;
        if tag.len() != TAG_SIZE {
            return Err(CryptoError::InvalidPayload(format!(
                "tag must be {TAG_SIZE} bytes, got {}",
                tag.len()
            )));
        }
        sealed.extend_from_slice(&tag);
    }

    cipher_for(key)
        .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
        .map_err(|_| {
            CryptoError::Decryption("authentication failed (wrong key or tampered data)".to_string())
        })
}

pub fn encrypt_string(key: &DerivedKey, plaintext: &str) -> CryptoResult<EncryptedPayload> {
    encrypt(key, plaintext.as_bytes())
}

pub fn decrypt_string(key: &DerivedKey, payload: &EncryptedPayload) -> CryptoResult<String> {
    let bytes = decrypt(key, payload)?;
    String::from_utf8(bytes)
        .map_err(|e| CryptoError::Decryption(format!("plaintext is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::generate_random_key;

    #[test]
    fn detached_tag_is_split_off() {
        let key = generate_random_key();
        let payload = encrypt_detached(&key, b"hello", &Salt::random()).unwrap();
        let tag = STANDARD.decode(payload.tag.as_ref().unwrap()).unwrap();
        let body = STANDARD.decode(&payload.ciphertext).unwrap();
        assert_eq!(tag.len(), TAG_SIZE);
        assert_eq!(body.len(), 5);
        assert_eq!(decrypt(&key, &payload).unwrap(), b"hello");
    }

    #[test]
    fn attached_payload_omits_salt_and_tag() {
        let key = generate_random_key();
        let payload = encrypt(&key, b"x").unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("salt").is_none());
        assert!(json.get("tag").is_none());
        assert_eq!(json["version"], PAYLOAD_VERSION);
    }

    #[test]
    fn unknown_version_rejected() {
        let key = generate_random_key();
        let mut payload = encrypt(&key, b"x").unwrap();
        payload.version = "9.9".to_string();
        assert!(matches!(
            decrypt(&key, &payload),
            Err(CryptoError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn short_iv_rejected() {
        let key = generate_random_key();
        let mut payload = encrypt(&key, b"x").unwrap();
        payload.iv = STANDARD.encode([0u8; 4]);
        assert!(matches!(
            decrypt(&key, &payload),
            Err(CryptoError::InvalidPayload(_))
        ));
    }
}
