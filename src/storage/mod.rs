//! Blob storage collaborator holding uploaded file bytes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

/// Failures raised by blob backends.
#[derive(Debug, Error)]
pub enum BlobError {
    /// No blob under this container and name.
    #[error("blob {container}/{name} not found")]
    NotFound {
        /// Container name.
        container: String,
        /// Blob name.
        name: String,
    },
    /// Container or blob name would escape the storage root.
    #[error("invalid blob path: {0}")]
    InvalidName(String),
    /// Filesystem access failed.
    #[error("blob I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Minimal download/upload interface over a blob service.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `container/blob_name`, replacing any previous content.
    async fn upload_file(
        &self,
        container: &str,
        blob_name: &str,
        bytes: &[u8],
    ) -> Result<(), BlobError>;

    /// Fetch the bytes stored under `container/blob_name`.
    async fn download_file(&self, container: &str, blob_name: &str) -> Result<Vec<u8>, BlobError>;
}

/// Blob store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload_file(
        &self,
        container: &str,
        blob_name: &str,
        bytes: &[u8],
    ) -> Result<(), BlobError> {
        self.blobs
            .write()
            .await
            .insert((container.to_string(), blob_name.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn download_file(&self, container: &str, blob_name: &str) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .read()
            .await
            .get(&(container.to_string(), blob_name.to_string()))
            .cloned()
            .ok_or_else(|| BlobError::NotFound {
                container: container.to_string(),
                name: blob_name.to_string(),
            })
    }
}

/// Blob store rooted in a local directory, one sub-directory per container.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Store rooted at `root`; directories are created on first upload.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, container: &str, blob_name: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(container).join(blob_name);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !safe || container.is_empty() || blob_name.is_empty() {
            return Err(BlobError::InvalidName(relative.display().to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload_file(
        &self,
        container: &str,
        blob_name: &str,
        bytes: &[u8],
    ) -> Result<(), BlobError> {
        let path = self.blob_path(container, blob_name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Blob stored");
        Ok(())
    }

    async fn download_file(&self, container: &str, blob_name: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.blob_path(container, blob_name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound {
                container: container.to_string(),
                name: blob_name.to_string(),
            }),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips_and_reports_missing() {
        let store = MemoryBlobStore::new();
        store.upload_file("sales", "d1/a.txt", b"hello").await.unwrap();
        assert_eq!(store.download_file("sales", "d1/a.txt").await.unwrap(), b"hello");
        assert!(matches!(
            store.download_file("ops", "d1/a.txt").await,
            Err(BlobError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn local_store_rejects_escaping_names() {
        let root = std::env::temp_dir().join(format!("kbcore-blobs-{}", uuid::Uuid::new_v4()));
        let store = LocalBlobStore::new(&root);
        assert!(matches!(
            store.upload_file("sales", "../etc/passwd", b"x").await,
            Err(BlobError::InvalidName(_))
        ));

        store.upload_file("sales", "d1/a.txt", b"hello").await.unwrap();
        assert_eq!(store.download_file("sales", "d1/a.txt").await.unwrap(), b"hello");
        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
