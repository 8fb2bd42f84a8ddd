//! Table names shared by every crate that persists through a [`crate::TableStore`].

/// Encrypted holdings, keyed by holding id.
pub const HOLDINGS: &str = "holdings";
/// Plaintext locations, keyed by location id.
pub const LOCATIONS: &str = "locations";
/// Plaintext tokens, keyed by upper-case symbol.
pub const TOKENS: &str = "tokens";
/// Per-entity sync metadata, keyed by `{kind}:{id}`.
pub const SYNC_METADATA: &str = "sync_metadata";
/// Durable deletion markers, keyed by `{kind}:{id}`.
pub const TOMBSTONES: &str = "tombstones";
/// Singleton settings (auth state, watermark, sync status).
pub const SETTINGS: &str = "settings";
