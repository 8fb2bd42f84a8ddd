#![allow(dead_code)]

use async_trait::async_trait;
use coinvault_cloud::{
    CloudResult, ManualSession, MemoryRemoteStore, RemoteFile, RemoteStore, SyncConfig,
};
use coinvault_crypto::{BackupKdfParams, KdfParams};
use coinvault_storage::{MemoryTableStore, TableStore};
use coinvault_sync::{ChangeTracker, PortfolioService, SyncCoordinator};
use coinvault_vault::{AuthService, Catalog, EncryptedVault, MemoryKeyCache};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

pub const PASSWORD: &str = "Abcd1234!";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn fast_backup_kdf() -> BackupKdfParams {
    BackupKdfParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        retry_attempts: 1,
        retry_delay_ms: 1,
        backup_kdf: fast_backup_kdf(),
        ..SyncConfig::default()
    }
}

/// One installation: its own local store, sharing a remote with others.
pub struct Device {
    pub store: Arc<dyn TableStore>,
    pub vault: Arc<EncryptedVault>,
    pub auth: Arc<AuthService>,
    pub catalog: Arc<Catalog>,
    pub tracker: Arc<ChangeTracker>,
    pub portfolio: PortfolioService,
    pub session: Arc<ManualSession>,
    pub coordinator: Arc<SyncCoordinator>,
}

impl Device {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        init_tracing();
        let store: Arc<dyn TableStore> = Arc::new(MemoryTableStore::new());
        let vault = Arc::new(EncryptedVault::new(
            Arc::clone(&store),
            Arc::new(MemoryKeyCache::new()),
        ));
        let auth = Arc::new(AuthService::new(
            Arc::clone(&vault),
            KdfParams::with_iterations(1_000),
        ));
        let catalog = Arc::new(Catalog::new(Arc::clone(&store)));
        catalog.ensure_initial_data().unwrap();
        let tracker = Arc::new(ChangeTracker::new(Arc::clone(&store)).unwrap());
        let portfolio = PortfolioService::new(
            Arc::clone(&vault),
            Arc::clone(&catalog),
            Arc::clone(&tracker),
        );
        let session = Arc::new(ManualSession::new(true));
        let coordinator = SyncCoordinator::new(
            Arc::clone(&auth),
            Arc::clone(&catalog),
            Arc::clone(&tracker),
            remote,
            session.clone(),
            test_config(),
        )
        .unwrap();
        Self {
            store,
            vault,
            auth,
            catalog,
            tracker,
            portfolio,
            session,
            coordinator,
        }
    }

    /// Quantities by symbol, sorted.
    pub fn quantities(&self) -> Vec<(String, f64)> {
        let mut out: Vec<_> = self
            .portfolio
            .holdings()
            .unwrap()
            .into_iter()
            .map(|h| (h.symbol, h.quantity))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

/// Memory remote whose `find_file` blocks while armed, until released.
#[derive(Default)]
pub struct GatedStore {
    pub inner: MemoryRemoteStore,
    pub armed: AtomicBool,
    pub release: Notify,
}

#[async_trait]
impl RemoteStore for GatedStore {
    async fn find_file(&self, folder: &str, file_name: &str) -> CloudResult<Option<RemoteFile>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.release.notified().await;
        }
        self.inner.find_file(folder, file_name).await
    }

    async fn download(&self, file: &RemoteFile) -> CloudResult<Vec<u8>> {
        self.inner.download(file).await
    }

    async fn upload(&self, folder: &str, file_name: &str, body: Vec<u8>) -> CloudResult<RemoteFile> {
        self.inner.upload(folder, file_name, body).await
    }

    async fn delete(&self, file: &RemoteFile) -> CloudResult<()> {
        self.inner.delete(file).await
    }
}
