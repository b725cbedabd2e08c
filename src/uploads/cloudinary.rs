use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use super::{ImageStorage, PendingImage, StoredImage};
use crate::config::CloudinaryConfig;
use crate::core::errors::ApiError;
use crate::core::helpers::random_hex;

/// Signed uploads to a Cloudinary-compatible image host.
pub struct CloudinaryStorage {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

/// Sorted `key=value` pairs joined by `&`, followed by the secret, SHA-1 hex.
pub fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

impl CloudinaryStorage {
    pub fn new(config: CloudinaryConfig) -> Self {
        info!("Storing uploads on image host cloud '{}'", config.cloud_name);
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/image/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            action
        )
    }
}

fn upstream(e: impl std::fmt::Display) -> ApiError {
    ApiError::Upstream(e.to_string())
}

#[async_trait]
impl ImageStorage for CloudinaryStorage {
    fn name(&self) -> &'static str {
        "cloudinary"
    }

    async fn store(&self, image: PendingImage) -> Result<StoredImage, ApiError> {
        let public_id = random_hex(10);
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(
            &[("public_id", public_id.as_str()), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );

        let file = Part::bytes(image.bytes)
            .file_name(image.original_name)
            .mime_str(&image.content_type)
            .map_err(upstream)?;
        let form = Form::new()
            .part("file", file)
            .text("api_key", self.config.api_key.clone())
            .text("public_id", public_id)
            .text("timestamp", timestamp)
            .text("signature", signature);

        let resp = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(upstream)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("upload returned {}: {}", status, body)));
        }

        let uploaded: UploadResponse = resp.json().await.map_err(upstream)?;
        debug!("Uploaded {}", uploaded.public_id);
        Ok(StoredImage {
            reference: uploaded.secure_url,
            key: uploaded.public_id,
        })
    }

    async fn remove(&self, image: &StoredImage) -> Result<(), ApiError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(
            &[("public_id", image.key.as_str()), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );
        let params = [
            ("public_id", image.key.as_str()),
            ("timestamp", timestamp.as_str()),
            ("api_key", self.config.api_key.as_str()),
            ("signature", signature.as_str()),
        ];

        let resp = self
            .client
            .post(self.endpoint("destroy"))
            .form(&params)
            .send()
            .await
            .map_err(upstream)?;

        if !resp.status().is_success() {
            return Err(ApiError::Upstream(format!("destroy returned {}", resp.status())));
        }
        let destroyed: DestroyResponse = resp.json().await.map_err(upstream)?;
        if destroyed.result != "ok" && destroyed.result != "not found" {
            return Err(ApiError::Upstream(format!("destroy result '{}'", destroyed.result)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_ignores_parameter_order() {
        let a = sign(&[("timestamp", "1315060510"), ("public_id", "sample")], "abcd");
        let b = sign(&[("public_id", "sample"), ("timestamp", "1315060510")], "abcd");
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
        assert_ne!(a, sign(&[("public_id", "sample"), ("timestamp", "1315060510")], "other"));
    }

    #[test]
    fn endpoint_joins_base_and_cloud() {
        let storage = CloudinaryStorage::new(CloudinaryConfig {
            cloud_name: "demo".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            api_base: "http://localhost:9000/v1_1/".to_string(),
        });
        assert_eq!(storage.endpoint("upload"), "http://localhost:9000/v1_1/demo/image/upload");
    }
}
