//! Object storage for referral attachments.
//!
//! The board only keeps the `(url, storage_id)` pair a backend hands back.
//! `LocalObjectStorage` keeps uploads on disk under the data directory and
//! the router serves them at `/files/<storage_id>`.

use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// One file received from a client, not yet stored.
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Client-side file name, kept as the display name.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    /// Lowercase extension of the client file name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// Identifiers returned by the backend for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
    pub storage_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid storage id: {0}")]
    InvalidId(String),
    #[error("Stored object not found: {0}")]
    Missing(String),
    #[error("Storage backend failure: {0}")]
    Backend(String),
}

/// Blocking object storage contract. No retries happen at this layer.
pub trait ObjectStorage: Send + Sync {
    fn store(&self, upload: &FileUpload) -> Result<StoredObject, StorageError>;
    fn remove(&self, storage_id: &str) -> Result<(), StorageError>;
}

/// Filesystem-backed storage rooted at one directory.
pub struct LocalObjectStorage {
    root: PathBuf,
    public_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, storage_id: &str) -> Result<PathBuf, StorageError> {
        let valid = !storage_id.is_empty()
            && !storage_id.starts_with('.')
            && storage_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        if !valid || storage_id.contains("..") {
            return Err(StorageError::InvalidId(storage_id.to_string()));
        }
        Ok(self.root.join(storage_id))
    }
}

impl ObjectStorage for LocalObjectStorage {
    fn store(&self, upload: &FileUpload) -> Result<StoredObject, StorageError> {
        let storage_id = match upload.extension() {
            Some(ext) if ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
                format!("{}.{ext}", Uuid::new_v4())
            }
            _ => Uuid::new_v4().to_string(),
        };
        let target = self.object_path(&storage_id)?;

        // Write to a temp file in the same directory, then rename into place,
        // so a failed write never leaves a partial object behind.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&upload.bytes)?;
        tmp.flush()?;
        tmp.persist(&target).map_err(|e| StorageError::Io(e.error))?;

        tracing::debug!(%storage_id, bytes = upload.bytes.len(), "Stored object");
        Ok(StoredObject {
            url: format!("{}/files/{storage_id}", self.public_url),
            storage_id,
        })
    }

    fn remove(&self, storage_id: &str) -> Result<(), StorageError> {
        let path = self.object_path(storage_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::Missing(storage_id.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
