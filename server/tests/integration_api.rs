use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use server::{build_app, ServerConfig};
use snapcore::{ChatModel, DescriptionStore};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

const BOUNDARY: &str = "X-SNAPSEARCH-TEST-BOUNDARY";

/// Fake model: every image describes to a fixed string, every ranking request
/// gets a canned reply mixing good, unknown, and prose lines.
struct FakeModel;

#[async_trait]
impl ChatModel for FakeModel {
    async fn complete_text(&self, _prompt: &str) -> Result<String> {
        Ok("Here are the top matches:\n\
            1. login.png: 92\n\
            2. ghost.png: 80\n\
            3. sunset.jpg: 40\n"
            .to_string())
    }

    async fn complete_vision(&self, _prompt: &str, _image: &[u8]) -> Result<String> {
        Ok("A login form with a blue Submit button".to_string())
    }
}

fn test_app(dir: &TempDir) -> Router {
    let config = ServerConfig {
        upload_dir: dir.path().join("screenshots"),
        store_path: dir.path().join("descriptions.json"),
        default_top_k: 5,
    };
    build_app(config, Arc::new(FakeModel)).unwrap()
}

fn seed_store(dir: &TempDir) {
    let mut store = DescriptionStore::new();
    store.insert("login.png".into(), "A login form with username and password fields".into());
    store.insert("sunset.jpg".into(), "An orange sunset over the ocean.".into());
    store.save(dir.path().join("descriptions.json")).unwrap();
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn multipart_upload(filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/upload")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn search_request(payload: Value) -> Request<Body> {
    Request::post("/search")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn search_returns_ranked_results_in_reply_order() {
    let dir = tempdir().unwrap();
    seed_store(&dir);
    let app = test_app(&dir);

    let resp = app.oneshot(search_request(json!({ "query": "login form" }))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;

    // ghost.png is not indexed and must have been discarded.
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["filename"], "login.png");
    assert_eq!(results[0]["confidence"], 92);
    assert_eq!(results[0]["image_url"], "/screenshots/login.png");
    assert_eq!(results[1]["filename"], "sunset.jpg");
    assert_eq!(results[1]["confidence"], 40);
    assert_eq!(json["total_found"], 2);
}

#[tokio::test]
async fn top_k_bounds_the_result_count() {
    let dir = tempdir().unwrap();
    seed_store(&dir);
    let app = test_app(&dir);

    let resp = app
        .oneshot(search_request(json!({ "query": "anything", "top_k": 1 })))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let dir = tempdir().unwrap();
    seed_store(&dir);
    let app = test_app(&dir);

    let resp = app.oneshot(search_request(json!({ "query": "" }))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "No query provided");
}

#[tokio::test]
async fn search_without_an_index_is_a_distinct_error() {
    let dir = tempdir().unwrap();
    let app = test_app(&dir);

    let resp = app.oneshot(search_request(json!({ "query": "login" }))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "No screenshots indexed yet");
}

#[tokio::test]
async fn duplicate_upload_is_skipped() {
    let dir = tempdir().unwrap();
    let app = test_app(&dir);

    let resp = app.clone().oneshot(multipart_upload("shot1.png", b"image-bytes")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["results"][0]["status"], "success");
    assert_eq!(json["total_processed"], 1);

    let resp = app.clone().oneshot(multipart_upload("shot1.png", b"image-bytes")).await.unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["results"][0]["status"], "skipped");
    assert_eq!(json["total_processed"], 0);

    // Exactly one store entry for shot1.png after both uploads.
    let store = DescriptionStore::load(dir.path().join("descriptions.json"));
    assert_eq!(store.len(), 1);

    let resp = app
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["total_images"], 1);
}

#[tokio::test]
async fn unsupported_file_type_is_a_per_item_error() {
    let dir = tempdir().unwrap();
    let app = test_app(&dir);

    let resp = app.oneshot(multipart_upload("notes.txt", b"plain text")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["results"][0]["status"], "error");
    assert_eq!(json["results"][0]["message"], "Invalid file type");
    assert_eq!(json["total_processed"], 0);
}

#[tokio::test]
async fn uploaded_screenshot_is_served_back() {
    let dir = tempdir().unwrap();
    let app = test_app(&dir);

    app.clone().oneshot(multipart_upload("shot1.png", b"image-bytes")).await.unwrap();

    let resp = app
        .oneshot(Request::get("/screenshots/shot1.png").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"image-bytes");
}

#[tokio::test]
async fn upload_failure_does_not_create_a_store_entry() {
    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        async fn complete_text(&self, _prompt: &str) -> Result<String> {
            Ok(String::new())
        }

        async fn complete_vision(&self, _prompt: &str, _image: &[u8]) -> Result<String> {
            anyhow::bail!("model unavailable")
        }
    }

    let dir = tempdir().unwrap();
    let config = ServerConfig {
        upload_dir: dir.path().join("screenshots"),
        store_path: dir.path().join("descriptions.json"),
        default_top_k: 5,
    };
    let app = build_app(config, Arc::new(FailingModel)).unwrap();

    let resp = app.oneshot(multipart_upload("shot1.png", b"image-bytes")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["results"][0]["status"], "error");

    let store = DescriptionStore::load(dir.path().join("descriptions.json"));
    assert!(store.is_empty());
    // The uploaded file itself is kept for a later retry.
    assert!(dir.path().join("screenshots").join("shot1.png").exists());
}
