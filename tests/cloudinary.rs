use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_multipart::Multipart;
use actix_web::{web, App, HttpResponse, HttpServer};
use futures_util::StreamExt;
use serde_json::json;

use roomly::config::CloudinaryConfig;
use roomly::core::errors::ApiError;
use roomly::uploads::cloudinary::sign;
use roomly::uploads::{store_all, CloudinaryStorage, ImageStorage, PendingImage};

const API_KEY: &str = "key-123";
const API_SECRET: &str = "shhh";

#[derive(Default)]
struct Host {
    uploaded: Mutex<Vec<String>>,
    destroyed: Mutex<Vec<String>>,
}

async fn upload(host: web::Data<Host>, mut payload: Multipart) -> HttpResponse {
    let mut params = HashMap::new();
    let mut filename = String::new();
    while let Some(Ok(mut field)) = payload.next().await {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(file) = field.content_disposition().and_then(|cd| cd.get_filename()) {
            filename = file.to_string();
        }
        let mut data = Vec::new();
        while let Some(Ok(chunk)) = field.next().await {
            data.extend_from_slice(&chunk);
        }
        if name != "file" {
            params.insert(name, String::from_utf8_lossy(&data).into_owned());
        }
    }

    let expected = sign(
        &[("public_id", params["public_id"].as_str()), ("timestamp", params["timestamp"].as_str())],
        API_SECRET,
    );
    if params["signature"] != expected || params["api_key"] != API_KEY {
        return HttpResponse::Unauthorized().json(json!({ "error": { "message": "Invalid Signature" } }));
    }
    if filename.contains("fail") {
        actix_web::rt::time::sleep(Duration::from_millis(200)).await;
        return HttpResponse::InternalServerError().json(json!({ "error": { "message": "boom" } }));
    }

    let public_id = params["public_id"].clone();
    host.uploaded.lock().unwrap().push(public_id.clone());
    HttpResponse::Ok().json(json!({
        "public_id": public_id,
        "secure_url": format!("https://img.test/demo/{public_id}.png"),
    }))
}

async fn destroy(host: web::Data<Host>, form: web::Form<HashMap<String, String>>) -> HttpResponse {
    let public_id = form["public_id"].clone();
    let mut destroyed = host.destroyed.lock().unwrap();
    if destroyed.contains(&public_id) {
        return HttpResponse::Ok().json(json!({ "result": "not found" }));
    }
    destroyed.push(public_id);
    HttpResponse::Ok().json(json!({ "result": "ok" }))
}

async fn start_host() -> (web::Data<Host>, String) {
    let host = web::Data::new(Host::default());
    let data = host.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/v1_1/demo/image/upload", web::post().to(upload))
            .route("/v1_1/demo/image/destroy", web::post().to(destroy))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();
    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    (host, format!("http://{addr}/v1_1"))
}

fn storage(api_base: String) -> CloudinaryStorage {
    CloudinaryStorage::new(CloudinaryConfig {
        cloud_name: "demo".to_string(),
        api_key: API_KEY.to_string(),
        api_secret: API_SECRET.to_string(),
        api_base,
    })
}

fn image(name: &str) -> PendingImage {
    PendingImage {
        original_name: name.to_string(),
        content_type: "image/png".to_string(),
        bytes: b"\x89PNG fake".to_vec(),
    }
}

#[actix_web::test]
async fn test_store_and_remove_round_trip() {
    let (host, base) = start_host().await;
    let storage = storage(base);

    let stored = storage.store(image("room.png")).await.unwrap();
    assert_eq!(stored.reference, format!("https://img.test/demo/{}.png", stored.key));
    assert_eq!(host.uploaded.lock().unwrap().as_slice(), [stored.key.clone()]);

    storage.remove(&stored).await.unwrap();
    storage.remove(&stored).await.unwrap();
    assert_eq!(host.destroyed.lock().unwrap().as_slice(), [stored.key]);
}

#[actix_web::test]
async fn test_wrong_secret_is_an_upstream_error() {
    let (_host, base) = start_host().await;
    let storage = CloudinaryStorage::new(CloudinaryConfig {
        cloud_name: "demo".to_string(),
        api_key: API_KEY.to_string(),
        api_secret: "wrong".to_string(),
        api_base: base,
    });

    let err = storage.store(image("room.png")).await.unwrap_err();
    assert!(matches!(err, ApiError::Upstream(_)));
}

#[actix_web::test]
async fn test_failed_upload_removes_completed_ones() {
    let (host, base) = start_host().await;
    let storage: Arc<dyn ImageStorage> = Arc::new(storage(base));

    let err = store_all(storage, vec![image("good.png"), image("fail.png")])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Upstream(_)));

    let uploaded = host.uploaded.lock().unwrap().clone();
    let destroyed = host.destroyed.lock().unwrap().clone();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded, destroyed);
}
