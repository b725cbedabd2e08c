use actix_web::{web, HttpResponse};
use mime_guess::from_path;
use rust_embed::RustEmbed;

use crate::config::ImageStorageConfig;
use crate::core::errors::{ApiError, ViewResult};
use crate::state::AppState;

#[derive(RustEmbed)]
#[folder = "static"]
struct Assets;

pub async fn serve_static(path: web::Path<String>) -> ViewResult {
    let file_path = path.trim_start_matches('/');

    let file = Assets::get(file_path)
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;

    let mime = from_path(file_path).first_or_octet_stream();

    Ok(HttpResponse::Ok()
        .content_type(mime.as_ref())
        .body(file.data.into_owned()))
}

/// Images written by the local-disk storage.
pub async fn serve_upload(state: web::Data<AppState>, name: web::Path<String>) -> ViewResult {
    let ImageStorageConfig::Local { upload_dir } = &state.config.image_storage else {
        return Err(ApiError::NotFound("File not found".to_string()).into());
    };

    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.')
        && !name.starts_with('.');
    if !valid {
        return Err(ApiError::NotFound("File not found".to_string()).into());
    }

    let bytes = match tokio::fs::read(upload_dir.join(name.as_str())).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("File not found".to_string()).into())
        }
        Err(e) => return Err(ApiError::Internal(format!("Failed to read upload {}: {}", name, e)).into()),
    };

    let mime = from_path(name.as_str()).first_or_octet_stream();
    Ok(HttpResponse::Ok()
        .content_type(mime.as_ref())
        .insert_header(("Cache-Control", "public, max-age=86400"))
        .body(bytes))
}
