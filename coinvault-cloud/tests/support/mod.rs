#![allow(dead_code)]

use async_trait::async_trait;
use coinvault_cloud::{CloudError, CloudResult, MemoryRemoteStore, RemoteFile, RemoteStore};
use coinvault_crypto::BackupKdfParams;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Argon2 parameters cheap enough for tests.
pub fn fast_kdf() -> BackupKdfParams {
    BackupKdfParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

/// Wraps a memory store and fails calls with queued errors first.
pub struct FlakyStore {
    pub inner: MemoryRemoteStore,
    failures: Mutex<VecDeque<CloudError>>,
    pub calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: Vec<CloudError>) -> Self {
        Self {
            inner: MemoryRemoteStore::new(),
            failures: Mutex::new(failures.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn next_failure(&self) -> Option<CloudError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.failures.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl RemoteStore for FlakyStore {
    async fn find_file(&self, folder: &str, file_name: &str) -> CloudResult<Option<RemoteFile>> {
        if let Some(e) = self.next_failure() {
            return Err(e);
        }
        self.inner.find_file(folder, file_name).await
    }

    async fn download(&self, file: &RemoteFile) -> CloudResult<Vec<u8>> {
        if let Some(e) = self.next_failure() {
            return Err(e);
        }
        self.inner.download(file).await
    }

    async fn upload(&self, folder: &str, file_name: &str, body: Vec<u8>) -> CloudResult<RemoteFile> {
        if let Some(e) = self.next_failure() {
            return Err(e);
        }
        self.inner.upload(folder, file_name, body).await
    }

    async fn delete(&self, file: &RemoteFile) -> CloudResult<()> {
        if let Some(e) = self.next_failure() {
            return Err(e);
        }
        self.inner.delete(file).await
    }
}
