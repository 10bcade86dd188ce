//! The blob store collaborator: opaque file storage for profile pictures
//! and group icons.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Blob too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Empty blob")]
    Empty,

    #[error("Invalid blob location: {0}")]
    InvalidLocation(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Storage(String),
}

/// A file received from a client, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Lower-cased extension of the original file name, if it has one.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// Stores uploads and hands back the URL they are served under.
pub trait BlobStore: Send + Sync + 'static {
    fn upload(
        &self,
        upload: &Upload,
        folder: &str,
    ) -> impl Future<Output = Result<String, BlobError>> + Send;

    fn delete(&self, url: &str) -> impl Future<Output = Result<(), BlobError>> + Send;
}

/// Best-effort removal of a blob that is no longer referenced.
pub(crate) async fn discard<B: BlobStore>(blobs: &B, url: &str) {
    if let Err(e) = blobs.delete(url).await {
        tracing::warn!(url, error = %e, "failed to delete orphaned blob");
    }
}

/// Process-local [`BlobStore`] keeping uploads in a map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, url: &str) -> bool {
        self.blobs.lock().await.contains_key(url)
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    async fn upload(&self, upload: &Upload, folder: &str) -> Result<String, BlobError> {
        if upload.bytes.is_empty() {
            return Err(BlobError::Empty);
        }
        let name = match upload.extension() {
            Some(ext) => format!("{}.{ext}", uuid::Uuid::new_v4()),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let url = format!("memory://{folder}/{name}");
        self.blobs.lock().await.insert(url.clone(), upload.bytes.clone());
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        match self.blobs.lock().await.remove(url) {
            Some(_) => Ok(()),
            None => Err(BlobError::NotFound(url.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_sanitised() {
        assert_eq!(Upload::new("me.PNG", vec![1u8]).extension().as_deref(), Some("png"));
        assert_eq!(Upload::new("archive.tar.gz", vec![1u8]).extension().as_deref(), Some("gz"));
        assert_eq!(Upload::new(".bashrc", vec![1u8]).extension(), None);
        assert_eq!(Upload::new("x./..", vec![1u8]).extension(), None);
        assert_eq!(Upload::new("noext", vec![1u8]).extension(), None);
    }

    #[tokio::test]
    async fn memory_store_round_trips_urls() {
        let store = MemoryBlobStore::new();
        let url = store.upload(&Upload::new("a.jpg", vec![1u8, 2]), "group_icons").await.unwrap();
        assert!(url.starts_with("memory://group_icons/"));
        assert!(url.ends_with(".jpg"));
        assert!(store.contains(&url).await);

        store.delete(&url).await.unwrap();
        assert!(store.is_empty().await);
        assert!(matches!(store.delete(&url).await, Err(BlobError::NotFound(_))));
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let store = MemoryBlobStore::new();
        assert!(matches!(
            store.upload(&Upload::new("a.jpg", Vec::<u8>::new()), "x").await,
            Err(BlobError::Empty)
        ));
    }
}
