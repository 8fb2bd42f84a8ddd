use coinvault_crypto::DerivedKey;
use std::sync::Mutex;

/// Session-scoped holder of the unlocking key, used for best-effort auto-unlock.
///
/// Never backed by the vault's own tables.
pub trait KeyCache: Send + Sync {
    fn load(&self) -> Option<DerivedKey>;
    fn store(&self, key: &DerivedKey);
    fn clear(&self);
}

/// Keeps the key for the lifetime of the process.
#[derive(Default)]
pub struct MemoryKeyCache {
    key: Mutex<Option<DerivedKey>>,
}

impl MemoryKeyCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyCache for MemoryKeyCache {
    fn load(&self) -> Option<DerivedKey> {
        self.key.lock().ok().and_then(|guard| guard.clone())
    }

    fn store(&self, key: &DerivedKey) {
        if let Ok(mut guard) = self.key.lock() {
            *guard = Some(key.clone());
        }
    }

    fn clear(&self) {
        if let Ok(mut guard) = self.key.lock() {
            *guard = None;
        }
    }
}

/// Disables auto-unlock entirely.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKeyCache;

impl KeyCache for NoKeyCache {
    fn load(&self) -> Option<DerivedKey> {
        None
    }

    fn store(&self, _key: &DerivedKey) {}

    fn clear(&self) {}
}
