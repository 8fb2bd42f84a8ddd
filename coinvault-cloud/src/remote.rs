//! The remote host the backup file lives on.

use crate::error::{CloudError, CloudResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coinvault_types::now_millis;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// A file found on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    /// Epoch milliseconds, when the host reports it.
    pub modified_at: Option<i64>,
    pub size: u64,
}

/// Blob storage addressed by folder and file name.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn find_file(&self, folder: &str, file_name: &str) -> CloudResult<Option<RemoteFile>>;

    async fn download(&self, file: &RemoteFile) -> CloudResult<Vec<u8>>;

    /// Creates the folder and file on first upload, overwrites afterwards.
    async fn upload(&self, folder: &str, file_name: &str, body: Vec<u8>) -> CloudResult<RemoteFile>;

    async fn delete(&self, file: &RemoteFile) -> CloudResult<()>;
}

/// Whether the remote host currently accepts requests from this user.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn is_authenticated(&self) -> bool;
}

/// A session whose state is set directly by the host application.
#[derive(Debug)]
pub struct ManualSession {
    authenticated: AtomicBool,
}

impl ManualSession {
    pub fn new(authenticated: bool) -> Self {
        Self {
            authenticated: AtomicBool::new(authenticated),
        }
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteSession for ManualSession {
    async fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Remote store kept in process memory. Several clients may share one.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    files: Mutex<HashMap<String, (RemoteFile, Vec<u8>)>>,
    uploads: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn file_id(folder: &str, file_name: &str) -> String {
        format!("{folder}/{file_name}")
    }

    /// Number of successful uploads so far.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Raw stored body, bypassing the trait.
    pub fn contents(&self, folder: &str, file_name: &str) -> Option<Vec<u8>> {
        let files = self.files.lock().ok()?;
        files
            .get(&Self::file_id(folder, file_name))
            .map(|(_, body)| body.clone())
    }

    /// Overwrites a body directly, without counting an upload.
    pub fn put_raw(&self, folder: &str, file_name: &str, body: Vec<u8>) {
        if let Ok(mut files) = self.files.lock() {
            let id = Self::file_id(folder, file_name);
            let file = RemoteFile {
                id: id.clone(),
                name: file_name.to_string(),
                modified_at: Some(now_millis()),
                size: body.len() as u64,
            };
            files.insert(id, (file, body));
        }
    }
}

fn poisoned() -> CloudError {
    CloudError::Network("remote store lock poisoned".to_string())
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn find_file(&self, folder: &str, file_name: &str) -> CloudResult<Option<RemoteFile>> {
        let files = self.files.lock().map_err(|_| poisoned())?;
        Ok(files
            .get(&Self::file_id(folder, file_name))
            .map(|(file, _)| file.clone()))
    }

    async fn download(&self, file: &RemoteFile) -> CloudResult<Vec<u8>> {
        let files = self.files.lock().map_err(|_| poisoned())?;
        files
            .get(&file.id)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| CloudError::NotFound(file.id.clone()))
    }

    async fn upload(&self, folder: &str, file_name: &str, body: Vec<u8>) -> CloudResult<RemoteFile> {
        let id = Self::file_id(folder, file_name);
        let file = RemoteFile {
            id: id.clone(),
            name: file_name.to_string(),
            modified_at: Some(now_millis()),
            size: body.len() as u64,
        };
        let mut files = self.files.lock().map_err(|_| poisoned())?;
        files.insert(id, (file.clone(), body));
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(file)
    }

    async fn delete(&self, file: &RemoteFile) -> CloudResult<()> {
        let mut files = self.files.lock().map_err(|_| poisoned())?;
        files
            .remove(&file.id)
            .map(|_| ())
            .ok_or_else(|| CloudError::NotFound(file.id.clone()))
    }
}

// ============================================================================
// Folder store
// ============================================================================

/// Remote store backed by a local directory, such as a folder a desktop
/// sync client mirrors to the cloud.
#[derive(Debug, Clone)]
pub struct FolderRemoteStore {
    root: PathBuf,
}

impl FolderRemoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, folder: &str, file_name: &str) -> PathBuf {
        self.root.join(folder).join(file_name)
    }

    async fn describe(path: &Path, name: &str) -> CloudResult<RemoteFile> {
        let meta = tokio::fs::metadata(path).await?;
        let modified_at = meta
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).timestamp_millis());
        Ok(RemoteFile {
            id: path.to_string_lossy().into_owned(),
            name: name.to_string(),
            modified_at,
            size: meta.len(),
        })
    }
}

#[async_trait]
impl RemoteStore for FolderRemoteStore {
    async fn find_file(&self, folder: &str, file_name: &str) -> CloudResult<Option<RemoteFile>> {
        let path = self.path_for(folder, file_name);
        match Self::describe(&path, file_name).await {
            Ok(file) => Ok(Some(file)),
            Err(CloudError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn download(&self, file: &RemoteFile) -> CloudResult<Vec<u8>> {
        match tokio::fs::read(&file.id).await {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CloudError::NotFound(file.id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, folder: &str, file_name: &str, body: Vec<u8>) -> CloudResult<RemoteFile> {
        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(file_name);
        let staging = dir.join(format!(".{file_name}.tmp"));
        tokio::fs::write(&staging, &body).await?;
        tokio::fs::rename(&staging, &path).await?;
        debug!("wrote {} bytes to {}", body.len(), path.display());
        Self::describe(&path, file_name).await
    }

    async fn delete(&self, file: &RemoteFile) -> CloudResult<()> {
        match tokio::fs::remove_file(&file.id).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CloudError::NotFound(file.id.clone())),
            Err(e) => Err(e.into()),
        }
    }
}
