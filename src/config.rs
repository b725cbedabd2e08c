use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use rand::{rngs::OsRng, RngCore};
use tracing::{info, warn};

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 30;
pub const MIN_PASSWORD_LENGTH: usize = 4;
pub const MAX_IMAGES_PER_POST: usize = 4;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_FIELD_BYTES: usize = 64 * 1024;
pub const MAX_DESCRIPTION_LENGTH: usize = 5000;
pub const MAX_TEXT_FIELD_LENGTH: usize = 200;
pub const POSTS_PER_PAGE: usize = 20;
pub const MAX_POSTS_PER_PAGE: usize = 100;

pub const SESSION_COOKIE: &str = "roomly_session";
pub const TOKEN_COOKIE: &str = "token";
pub const IMAGE_FIELD: &str = "images";

/// Where the document store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    Memory,
    File(PathBuf),
}

impl FromStr for DatabaseUrl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("database url is empty".to_string());
        }
        if s == "memory" || s == "memory:" {
            return Ok(DatabaseUrl::Memory);
        }
        let path = s.strip_prefix("file:").unwrap_or(s);
        if path.is_empty() {
            return Err(format!("database url '{s}' has no path"));
        }
        Ok(DatabaseUrl::File(PathBuf::from(path)))
    }
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub enum ImageStorageConfig {
    Local { upload_dir: PathBuf },
    Cloudinary(CloudinaryConfig),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: DatabaseUrl,
    pub session_hours: i64,
    pub jwt_secret: String,
    pub token_expiration_hours: i64,
    pub image_storage: ImageStorageConfig,
    pub seed_demo: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let storage_kind: String = try_load("ROOMLY_IMAGE_STORAGE", "local")?;
        let image_storage = match storage_kind.as_str() {
            "local" => ImageStorageConfig::Local {
                upload_dir: try_load::<String>("ROOMLY_UPLOAD_DIR", "public/images/uploads")?.into(),
            },
            "cloudinary" => ImageStorageConfig::Cloudinary(CloudinaryConfig {
                cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
                api_key: required("CLOUDINARY_API_KEY")?,
                api_secret: required("CLOUDINARY_API_SECRET")?,
                api_base: try_load("CLOUDINARY_API_BASE", "https://api.cloudinary.com/v1_1")?,
            }),
            other => anyhow::bail!("ROOMLY_IMAGE_STORAGE must be 'local' or 'cloudinary', got '{other}'"),
        };

        let database_url = try_load::<String>("ROOMLY_DATABASE_URL", "file:data/roomly.json")?
            .parse::<DatabaseUrl>()
            .map_err(|e| anyhow::anyhow!("Invalid ROOMLY_DATABASE_URL: {e}"))?;

        Ok(Self {
            bind_addr: try_load("ROOMLY_BIND_ADDR", "0.0.0.0:3000")?,
            database_url,
            session_hours: try_load("ROOMLY_SESSION_HOURS", "24")?,
            jwt_secret: jwt_secret(),
            token_expiration_hours: try_load("ROOMLY_TOKEN_EXPIRATION_HOURS", "1")?,
            image_storage,
            seed_demo: try_load("ROOMLY_SEED_DEMO", "false")?,
        })
    }

    /// In-memory store and local uploads under `upload_dir`.
    pub fn for_tests(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            database_url: DatabaseUrl::Memory,
            session_hours: 24,
            jwt_secret: "test-secret".to_string(),
            token_expiration_hours: 1,
            image_storage: ImageStorageConfig::Local {
                upload_dir: upload_dir.into(),
            },
            seed_demo: false,
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow::anyhow!("Invalid {key} value '{raw}': {e}"))
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("{key} must be set"))
}

fn jwt_secret() -> String {
    env::var("ROOMLY_JWT_SECRET").unwrap_or_else(|_| {
        warn!("ROOMLY_JWT_SECRET not set, tokens will not survive a restart");
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    })
}
