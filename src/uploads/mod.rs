//! Image upload handling.
//!
//! A request's files are read fully and type-checked before anything is
//! written, then handed to the configured [`ImageStorage`] concurrently.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use actix_multipart::{Field, Multipart};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::{ImageStorageConfig, IMAGE_FIELD, MAX_FIELD_BYTES, MAX_IMAGES_PER_POST, MAX_IMAGE_BYTES};
use crate::core::errors::ApiError;
use crate::core::helpers::random_hex;

pub mod cloudinary;
pub mod local;

pub use cloudinary::CloudinaryStorage;
pub use local::LocalDiskStorage;

pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/png", "image/jpg", "image/jpeg"];

/// A file received from the client, not yet stored anywhere.
#[derive(Debug, Clone)]
pub struct PendingImage {
    pub original_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Where an image ended up.
///
/// `reference` goes into the post's `images`; `key` is what the backend
/// needs to remove it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub reference: String,
    pub key: String,
}

#[async_trait]
pub trait ImageStorage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn store(&self, image: PendingImage) -> Result<StoredImage, ApiError>;

    async fn remove(&self, image: &StoredImage) -> Result<(), ApiError>;
}

pub fn storage_from_config(config: &ImageStorageConfig) -> anyhow::Result<Arc<dyn ImageStorage>> {
    Ok(match config {
        ImageStorageConfig::Local { upload_dir } => Arc::new(LocalDiskStorage::new(upload_dir)?),
        ImageStorageConfig::Cloudinary(cfg) => Arc::new(CloudinaryStorage::new(cfg.clone())),
    })
}

pub fn file_filter(content_type: &str) -> Result<(), ApiError> {
    if ALLOWED_IMAGE_TYPES.contains(&content_type) {
        Ok(())
    } else {
        Err(ApiError::UnsupportedMediaType(content_type.to_string()))
    }
}

/// Random hex name that keeps the original extension.
pub fn generate_filename(original_name: &str) -> String {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();
    format!("{}{}", random_hex(10), extension)
}

/// Text fields and image files of a listing form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub images: Vec<PendingImage>,
}

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?;
        if data.len() + chunk.len() > limit {
            return Err(ApiError::BadRequest(format!("Field exceeds {} bytes", limit)));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

pub async fn read_upload_form(mut payload: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?;
        let name = field.name().unwrap_or_default().to_string();
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let Some(filename) = filename else {
            let value = read_field(&mut field, MAX_FIELD_BYTES).await?;
            let value = String::from_utf8(value)
                .map_err(|_| ApiError::BadRequest(format!("Field '{}' is not valid UTF-8", name)))?;
            form.fields.insert(name, value);
            continue;
        };

        // Browsers send an empty file part when nothing was picked.
        if filename.is_empty() {
            read_field(&mut field, MAX_IMAGE_BYTES).await?;
            continue;
        }
        if name != IMAGE_FIELD {
            return Err(ApiError::BadRequest(format!("Unexpected file field '{}'", name)));
        }
        if form.images.len() == MAX_IMAGES_PER_POST {
            return Err(ApiError::BadRequest(format!(
                "At most {} images per post",
                MAX_IMAGES_PER_POST
            )));
        }

        let content_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();
        file_filter(&content_type)?;

        let bytes = read_field(&mut field, MAX_IMAGE_BYTES).await?;
        debug!("Received image '{}' ({} bytes)", filename, bytes.len());
        form.images.push(PendingImage {
            original_name: filename,
            content_type,
            bytes,
        });
    }

    Ok(form)
}

/// Stores every image concurrently, keeping submission order.
///
/// The first failure aborts the uploads still in flight and removes the
/// ones that already finished.
pub async fn store_all(
    storage: Arc<dyn ImageStorage>,
    images: Vec<PendingImage>,
) -> Result<Vec<StoredImage>, ApiError> {
    let mut slots: Vec<Option<StoredImage>> = vec![None; images.len()];
    let mut tasks = JoinSet::new();

    for (index, image) in images.into_iter().enumerate() {
        let storage = Arc::clone(&storage);
        tasks.spawn(async move { (index, storage.store(image).await) });
    }

    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(stored))) => slots[index] = Some(stored),
            Ok((_, Err(e))) => {
                failure = Some(e);
                break;
            }
            Err(e) => {
                failure = Some(ApiError::Internal(format!("Upload task failed: {}", e)));
                break;
            }
        }
    }

    let Some(error) = failure else {
        return Ok(slots.into_iter().flatten().collect());
    };

    tasks.abort_all();
    while let Some(joined) = tasks.join_next().await {
        if let Ok((index, Ok(stored))) = joined {
            slots[index] = Some(stored);
        }
    }
    let finished: Vec<StoredImage> = slots.into_iter().flatten().collect();
    warn!(
        "Upload to {} failed, removing {} stored image(s)",
        storage.name(),
        finished.len()
    );
    remove_all(storage.as_ref(), &finished).await;
    Err(error)
}

pub async fn remove_all(storage: &dyn ImageStorage, images: &[StoredImage]) {
    for image in images {
        if let Err(e) = storage.remove(image).await {
            warn!("Failed to remove image {}: {}", image.key, e);
        }
    }
}
