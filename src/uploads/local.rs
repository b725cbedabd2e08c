use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use super::{generate_filename, ImageStorage, PendingImage, StoredImage};
use crate::core::errors::ApiError;

/// Writes images into a directory; the reference is the bare file name.
pub struct LocalDiskStorage {
    dir: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create upload dir {}", dir.display()))?;
        info!("Storing uploads in {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ImageStorage for LocalDiskStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn store(&self, image: PendingImage) -> Result<StoredImage, ApiError> {
        let filename = generate_filename(&image.original_name);
        let path = self.dir.join(&filename);
        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(StoredImage {
            reference: filename.clone(),
            key: filename,
        })
    }

    async fn remove(&self, image: &StoredImage) -> Result<(), ApiError> {
        match tokio::fs::remove_file(self.dir.join(&image.key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::Internal(format!("Failed to remove {}: {}", image.key, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDiskStorage::new(dir.path().join("uploads")).unwrap();

        let stored = storage
            .store(PendingImage {
                original_name: "room.jpeg".to_string(),
                content_type: "image/jpeg".to_string(),
                bytes: b"jpegdata".to_vec(),
            })
            .await
            .unwrap();

        assert!(stored.reference.ends_with(".jpeg"));
        let path = storage.dir().join(&stored.key);
        assert_eq!(std::fs::read(&path).unwrap(), b"jpegdata");

        storage.remove(&stored).await.unwrap();
        assert!(!path.exists());
        storage.remove(&stored).await.unwrap();
    }
}
