use axum::extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use snapcore::{ingest_one, rank, ChatModel, DescriptionStore, ItemStatus, RankError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

pub struct ServerConfig {
    /// Directory uploaded screenshots are stored in and served from.
    pub upload_dir: PathBuf,
    /// Path of the persisted description store.
    pub store_path: PathBuf,
    /// Result count for /search when the request does not override it.
    pub default_top_k: usize,
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    model: Arc<dyn ChatModel>,
    /// Serializes the load -> mutate -> save cycle on the store file. The
    /// store contract is wholesale load and wholesale save, so overlapping
    /// ingestions through this server would lose updates without this.
    ingest_lock: Arc<Mutex<()>>,
}

pub fn build_app(config: ServerConfig, model: Arc<dyn ChatModel>) -> anyhow::Result<Router> {
    std::fs::create_dir_all(&config.upload_dir)?;
    let state = AppState {
        config: Arc::new(config),
        model,
        ingest_lock: Arc::new(Mutex::new(())),
    };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/upload", post(upload_handler))
        .route("/search", post(search_handler))
        .route("/status", get(status_handler))
        .route("/screenshots/:filename", get(screenshot_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
        .layer(cors);
    Ok(app)
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

/// Accept one or more images under the multipart field `files`, describe each
/// new one, and persist the enlarged store once for the whole request.
async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    // One in-flight ingestion cycle at a time; see AppState::ingest_lock.
    let _guard = state.ingest_lock.lock().await;
    let mut store = DescriptionStore::load(&state.config.store_path);
    let mut results: Vec<Value> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(&format!("malformed upload: {err}")))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let Some(raw_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                results.push(item_result(&raw_name, "error", &format!("failed to read upload: {err}")));
                continue;
            }
        };

        let Some(filename) = sanitize_filename(&raw_name) else {
            results.push(item_result(&raw_name, "error", "Invalid file type"));
            continue;
        };

        let dest = state.config.upload_dir.join(&filename);
        if dest.exists() {
            results.push(item_result(&filename, "skipped", "File already exists"));
            continue;
        }
        if let Err(err) = tokio::fs::write(&dest, &bytes).await {
            results.push(item_result(&filename, "error", &format!("failed to save file: {err}")));
            continue;
        }

        let identifier = dest.to_string_lossy().to_string();
        let status = ingest_one(state.model.as_ref(), &identifier, &bytes, &mut store).await;
        let message = match &status {
            ItemStatus::Indexed => "File uploaded and processed".to_string(),
            ItemStatus::Skipped => "File already exists".to_string(),
            ItemStatus::Failed(reason) => format!("Failed to process image: {reason}"),
        };
        results.push(item_result(&filename, status.label(), &message));
    }

    if results.is_empty() {
        return Err(bad_request("No files provided"));
    }

    store
        .save(&state.config.store_path)
        .map_err(|err| {
            tracing::error!(%err, "failed to persist store after upload");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "failed to persist index" })))
        })?;

    let total_processed = results.iter().filter(|r| r["status"] == "success").count();
    Ok(Json(json!({ "results": results, "total_processed": total_processed })))
}

fn item_result(filename: &str, status: &str, message: &str) -> Value {
    json!({ "filename": filename, "status": status, "message": message })
}

/// Keep only plain basenames with a supported image extension. Rejecting
/// anything with path components also closes off traversal via crafted
/// filenames.
fn sanitize_filename(raw: &str) -> Option<String> {
    let name = Path::new(raw).file_name()?.to_str()?;
    if name != raw || !snapcore::is_supported_image(name) {
        return None;
    }
    Some(name.to_string())
}

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
    top_k: Option<usize>,
}

async fn search_handler(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let store = DescriptionStore::load(&state.config.store_path);
    let top_k = req.top_k.unwrap_or(state.config.default_top_k);

    let results = rank(state.model.as_ref(), &req.query, &store, top_k)
        .await
        .map_err(|err| match err {
            RankError::EmptyQuery => bad_request("No query provided"),
            RankError::EmptyStore => bad_request("No screenshots indexed yet"),
        })?;

    let formatted: Vec<Value> = results
        .iter()
        .map(|r| {
            let name = Path::new(&r.identifier)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| r.identifier.clone());
            json!({
                "filename": name,
                "full_path": r.identifier,
                "description": r.description,
                "confidence": r.confidence,
                "image_url": format!("/screenshots/{name}"),
            })
        })
        .collect();

    Ok(Json(json!({
        "results": formatted,
        "query": req.query,
        "total_found": formatted.len(),
    })))
}

async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    let store = DescriptionStore::load(&state.config.store_path);
    let indexed_files: Vec<&str> = store.keys().collect();
    Json(json!({
        "total_images": store.len(),
        "indexed_files": indexed_files,
    }))
}

/// Serve an uploaded screenshot by basename.
async fn screenshot_handler(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> impl IntoResponse {
    let Some(filename) = sanitize_filename(&filename) else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };
    let path = state.config.upload_dir.join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type_for(&filename))], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

fn content_type_for(filename: &str) -> &'static str {
    match Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
