use std::path::{Component, Path, PathBuf};

use kinship_core::{BlobError, BlobStore, Upload};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

/// Verify that a resolved path stays within the expected base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, BlobError> {
    let mut resolved = base.to_path_buf();
    for component in target.strip_prefix(base).unwrap_or(target).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            _ => {
                return Err(BlobError::InvalidLocation(
                    "Path traversal detected".to_string(),
                ))
            }
        }
    }
    if !resolved.starts_with(base) {
        return Err(BlobError::InvalidLocation(
            "Path traversal detected".to_string(),
        ));
    }
    Ok(resolved)
}

/// A single folder or file name: no separators, no leading dot.
fn valid_segment(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('.')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Uploads kept as plain files under `{base_path}/{folder}/{uuid}.{ext}` and
/// served from `{public_url}/{folder}/{file}`.
#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    base_path: PathBuf,
    public_url: String,
    max_size: usize,
}

impl DiskBlobStore {
    pub async fn new(
        base_path: PathBuf,
        public_url: impl Into<String>,
        max_size: usize,
    ) -> Result<Self, BlobError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            BlobError::Storage(format!(
                "Failed to create blob directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;
        // canonical once, so traversal checks compare like with like
        let base_path = base_path.canonicalize().unwrap_or(base_path);

        info!(path = %base_path.display(), "Blob store initialized");

        Ok(Self {
            base_path,
            public_url: public_url.into().trim_end_matches('/').to_string(),
            max_size,
        })
    }

    pub async fn read(&self, folder: &str, file: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.safe_path(folder, file)?;
        match fs::read(&path).await {
            Ok(data) => {
                debug!(folder, file, size = data.len(), "Read blob");
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(format!("{folder}/{file}")))
            }
            Err(e) => Err(BlobError::Storage(format!(
                "Failed to read blob {folder}/{file}: {e}"
            ))),
        }
    }

    fn url_for(&self, folder: &str, file: &str) -> String {
        format!("{}/{folder}/{file}", self.public_url)
    }

    /// Split a URL produced by [`Self::url_for`] back into folder and file.
    fn locate<'u>(&self, url: &'u str) -> Result<(&'u str, &'u str), BlobError> {
        url.strip_prefix(self.public_url.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|rest| rest.split_once('/'))
            .ok_or_else(|| BlobError::InvalidLocation(url.to_string()))
    }

    fn safe_path(&self, folder: &str, file: &str) -> Result<PathBuf, BlobError> {
        if !valid_segment(folder) || !valid_segment(file) {
            return Err(BlobError::InvalidLocation(format!("{folder}/{file}")));
        }
        let target = self.base_path.join(folder).join(file);
        ensure_within(&self.base_path, &target)
    }
}

impl BlobStore for DiskBlobStore {
    async fn upload(&self, upload: &Upload, folder: &str) -> Result<String, BlobError> {
        let size = upload.bytes.len();
        if size == 0 {
            return Err(BlobError::Empty);
        }
        if size > self.max_size {
            return Err(BlobError::TooLarge {
                size,
                max: self.max_size,
            });
        }

        let file = match upload.extension() {
            Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
            None => Uuid::new_v4().to_string(),
        };
        let path = self.safe_path(folder, &file)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| BlobError::Storage(format!("Failed to create folder {folder}: {e}")))?;
        }

        fs::write(&path, &upload.bytes)
            .await
            .map_err(|e| BlobError::Storage(format!("Failed to write blob {folder}/{file}: {e}")))?;

        debug!(folder, file = %file, size, "Stored blob");
        Ok(self.url_for(folder, &file))
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        let (folder, file) = self.locate(url)?;
        let path = self.safe_path(folder, file)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(folder, file, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(url.to_string()))
            }
            Err(e) => Err(BlobError::Storage(format!("Failed to delete blob {url}: {e}"))),
        }
    }
}
