use coinvault_cloud::SyncConfig;
use std::time::Duration;

#[test]
fn default_retry_attempts() {
    assert_eq!(SyncConfig::default().retry_attempts, 3);
}

#[test]
fn default_retry_delay() {
    assert_eq!(SyncConfig::default().retry_delay_ms, 2_000);
}

#[test]
fn default_conflict_check_interval() {
    assert_eq!(
        SyncConfig::default().conflict_check_interval(),
        Duration::from_secs(30)
    );
}

#[test]
fn default_auto_sync_interval() {
    assert_eq!(
        SyncConfig::default().auto_sync_interval(),
        Duration::from_secs(300)
    );
}

#[test]
fn default_max_backup_size() {
    assert_eq!(SyncConfig::default().max_backup_size, 10 * 1024 * 1024);
}

#[test]
fn default_remote_location() {
    let config = SyncConfig::default();
    assert_eq!(config.app_folder, "CryptoPortfolioApp");
    assert_eq!(config.backup_file_name, "portfolio-backup.json");
}

#[test]
fn default_encryption_label() {
    assert_eq!(SyncConfig::default().encryption_algorithm, "ChaCha20-Poly1305");
}

#[test]
fn retry_policy_from_config() {
    let policy = SyncConfig::default().retry_policy();
    assert_eq!(policy.max_retries, 3);
    assert_eq!(policy.base_delay, Duration::from_millis(2_000));
}

#[test]
fn partial_json_fills_defaults() {
    let config = SyncConfig::from_json(r#"{"auto_sync_interval_secs": 60}"#).unwrap();
    assert_eq!(config.auto_sync_interval_secs, 60);
    assert_eq!(config.retry_attempts, 3);
}

#[test]
fn serialization_roundtrip() {
    let config = SyncConfig::default();
    let json = serde_json::to_string(&config).unwrap();
    let back = SyncConfig::from_json(&json).unwrap();
    assert_eq!(back.app_folder, config.app_folder);
    assert_eq!(back.backup_kdf, config.backup_kdf);
}

#[test]
fn zero_interval_rejected() {
    assert!(SyncConfig::from_json(r#"{"auto_sync_interval_secs": 0}"#).is_err());
}

#[test]
fn excessive_retries_rejected() {
    let config = SyncConfig {
        retry_attempts: 50,
        ..SyncConfig::default()
    };
    assert!(config.validate().is_err());
}
