use coinvault_crypto::{derive_key, hash_password, verify_password, DerivedKey, KdfParams, Salt};

fn fast() -> KdfParams {
    KdfParams::with_iterations(1_000)
}

#[test]
fn correct_password_verifies() {
    let verifier = hash_password("Abcd1234!", None, &fast()).unwrap();
    assert!(verify_password("Abcd1234!", &verifier, &fast()).unwrap());
}

#[test]
fn wrong_password_rejected() {
    let verifier = hash_password("Abcd1234!", None, &fast()).unwrap();
    assert!(!verify_password("Abcd1234?", &verifier, &fast()).unwrap());
}

#[test]
fn empty_password_rejected() {
    let verifier = hash_password("Abcd1234!", None, &fast()).unwrap();
    assert!(!verify_password("", &verifier, &fast()).unwrap());
}

#[test]
fn verifier_never_equals_unlocking_key() {
    use base64::{engine::general_purpose::STANDARD, Engine};
    let salt = Salt::random();
    let verifier = hash_password("Abcd1234!", Some(&salt), &fast()).unwrap();
    let (key, _) = derive_key("Abcd1234!", Some(&salt), &fast()).unwrap();
    assert_ne!(STANDARD.decode(&verifier.hash).unwrap(), key.as_bytes().to_vec());
}

#[test]
fn same_password_different_salts_differ() {
    let a = hash_password("Abcd1234!", None, &fast()).unwrap();
    let b = hash_password("Abcd1234!", None, &fast()).unwrap();
    assert_ne!(a.salt, b.salt);
    assert_ne!(a.hash, b.hash);
}

#[test]
fn corrupt_verifier_salt_is_error() {
    let mut verifier = hash_password("Abcd1234!", None, &fast()).unwrap();
    verifier.salt = "not base64!".to_string();
    assert!(verify_password("Abcd1234!", &verifier, &fast()).is_err());
}

#[test]
fn truncated_verifier_hash_rejected() {
    use base64::{engine::general_purpose::STANDARD, Engine};
    let mut verifier = hash_password("Abcd1234!", None, &fast()).unwrap();
    let mut hash = STANDARD.decode(&verifier.hash).unwrap();
    hash.truncate(16);
    verifier.hash = STANDARD.encode(hash);
    assert!(!verify_password("Abcd1234!", &verifier, &fast()).unwrap());
}

#[test]
fn derived_key_equality() {
    let salt = Salt::random();
    let (a, _) = derive_key("Abcd1234!", Some(&salt), &fast()).unwrap();
    let (b, _) = derive_key("Abcd1234!", Some(&salt), &fast()).unwrap();
    let (c, _) = derive_key("Abcd1234?", Some(&salt), &fast()).unwrap();
    assert!(a.ct_eq(&b));
    assert!(!a.ct_eq(&c));

    let mut flipped = *a.as_bytes();
    flipped[31] ^= 1;
    assert!(!a.ct_eq(&DerivedKey::from_bytes(flipped)));
}
