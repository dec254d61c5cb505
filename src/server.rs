//! HTTP server.
//!
//! Exposes the record store and the asset tree as a JSON API, and serves
//! uploaded assets as static files under `/<cubes_dir>`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/cubes` | List every record |
//! | `GET`  | `/api/cubes/new-id` | Preview the next generated id |
//! | `GET`  | `/api/cubes/{id}` | Fetch one record |
//! | `GET`  | `/api/cubes/{id}/files` | List a record's stored assets |
//! | `POST` | `/api/cubes` | Create a record (admin) |
//! | `PUT`  | `/api/cubes/{id}` | Merge fields into a record (admin) |
//! | `DELETE` | `/api/cubes/{id}` | Delete a record and its assets (admin) |
//! | `POST` | `/api/upload/images` | Upload images, multipart (admin) |
//! | `POST` | `/api/upload/solution` | Upload one PDF, multipart (admin) |
//! | `DELETE` | `/api/upload/image` | Delete an image by URL path (admin) |
//! | `DELETE` | `/api/upload/solution` | Delete a PDF by URL path (admin) |
//! | `POST` | `/api/auth/login` | Exchange the admin password for a token |
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "record 7 not found" } }
//! ```
//!
//! Error codes: `bad_request`, `invalid_id`, `invalid_path` (400),
//! `unauthorized` (401), `not_found` (404), `conflict` (409), `internal` (500).
//! Internal errors are logged and returned without detail.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser front-end
//! can be served from a different origin during development.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::assets::AssetListing;
use crate::auth::Authenticator;
use crate::config::Config;
use crate::error::CatalogError;
use crate::models::{AssetClass, Record};
use crate::store::RecordStore;
use crate::upload::{read_multipart, store_upload, UploadPolicy};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    store: RecordStore,
    uploads: Arc<UploadPolicy>,
    auth: Arc<Authenticator>,
}

impl AppState {
    fn new(config: &Config) -> Self {
        Self {
            store: RecordStore::from_config(config),
            uploads: Arc::new(UploadPolicy::new(&config.uploads)),
            auth: Arc::new(Authenticator::new(&config.auth)),
        }
    }

    fn require_admin(&self, headers: &HeaderMap) -> Result<(), AppError> {
        let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        Ok(self.auth.authorize(header)?)
    }
}

/// Builds the router for `config`. Exposed separately from [`run_server`]
/// so callers can embed or test it without binding a socket.
pub fn router(config: &Config) -> Router {
    let state = AppState::new(config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = DefaultBodyLimit::max(state.uploads.body_limit());
    let assets_mount = format!("/{}", state.store.assets().cubes_dir());
    let assets_service = ServeDir::new(state.store.assets().cubes_root());

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/cubes", get(handle_list).post(handle_create))
        .route("/api/cubes/new-id", get(handle_new_id))
        .route(
            "/api/cubes/{id}",
            get(handle_get).put(handle_update).delete(handle_delete),
        )
        .route("/api/cubes/{id}/files", get(handle_files))
        .route(
            "/api/upload/images",
            post(handle_upload_images).layer(upload_limit.clone()),
        )
        .route(
            "/api/upload/solution",
            post(handle_upload_solution)
                .layer(upload_limit)
                .delete(handle_delete_solution),
        )
        .route("/api/upload/image", delete(handle_delete_image))
        .route("/api/auth/login", post(handle_login))
        .nest_service(&assets_mount, assets_service)
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind`, makes sure the store
/// document and asset root exist, and serves until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = RecordStore::from_config(config);
    store.ensure_document().await?;
    tokio::fs::create_dir_all(store.assets().cubes_root()).await?;

    let app = router(config);
    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    info!(
        addr = %bind_addr,
        store = %store.path().display(),
        assets = %store.assets().root().display(),
        auth = config.auth.is_enabled(),
        "catalog server listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if err.is_internal() {
            error!(error = %err, "request failed");
            "internal server error".to_string()
        } else {
            err.to_string()
        };
        AppError {
            status,
            code: err.code().to_string(),
            message,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

fn message(text: impl Into<String>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.into(),
    })
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Records ============

async fn handle_list(State(state): State<AppState>) -> Result<Json<Vec<Record>>, AppError> {
    Ok(Json(state.store.list_all().await?))
}

#[derive(Serialize)]
struct NewIdResponse {
    id: String,
}

async fn handle_new_id(State(state): State<AppState>) -> Result<Json<NewIdResponse>, AppError> {
    Ok(Json(NewIdResponse {
        id: state.store.next_id().await?,
    }))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Record>, AppError> {
    Ok(Json(state.store.get_by_id(&id).await?))
}

async fn handle_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AssetListing>, AppError> {
    Ok(Json(state.store.assets().list(&id).await?))
}

/// Handler for `POST /api/cubes`. Returns `201` with the stored record.
async fn handle_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Record>), AppError> {
    state.require_admin(&headers)?;
    let Json(payload) = payload?;
    let record = state.store.create(payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Handler for `PUT /api/cubes/{id}`. Unknown fields in the body are ignored.
async fn handle_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Record>, AppError> {
    state.require_admin(&headers)?;
    let Json(payload) = payload?;
    Ok(Json(state.store.update(&id, payload).await?))
}

/// Handler for `DELETE /api/cubes/{id}`. Succeeds even when the asset
/// directory could not be removed.
async fn handle_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.require_admin(&headers)?;
    let removed = state.store.delete(&id).await?;
    Ok(message(format!("record {} deleted", removed.id)))
}

// ============ Uploads ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageUploadResponse {
    image_urls: Vec<String>,
    message: String,
    count: usize,
}

async fn handle_upload_images(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ImageUploadResponse>, AppError> {
    state.require_admin(&headers)?;
    let request = read_multipart(multipart, "images", state.uploads.max_file_bytes()).await?;
    let stored = store_upload(
        state.store.assets(),
        &state.uploads,
        AssetClass::Image,
        request,
    )
    .await?;

    let count = stored.len();
    Ok(Json(ImageUploadResponse {
        image_urls: stored.into_iter().map(|s| s.url).collect(),
        message: format!("{} image(s) uploaded", count),
        count,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SolutionUploadResponse {
    filename: String,
    solution_url: String,
    original_name: String,
    message: String,
}

async fn handle_upload_solution(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<SolutionUploadResponse>, AppError> {
    state.require_admin(&headers)?;
    let request = read_multipart(multipart, "solution", state.uploads.max_file_bytes()).await?;
    let stored = store_upload(
        state.store.assets(),
        &state.uploads,
        AssetClass::Solution,
        request,
    )
    .await?;

    let asset = stored
        .into_iter()
        .next()
        .ok_or_else(|| bad_request("no file provided"))?;
    Ok(Json(SolutionUploadResponse {
        filename: asset.filename,
        solution_url: asset.url,
        original_name: asset.original_name,
        message: "solution uploaded".to_string(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteImageRequest {
    image_path: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteSolutionRequest {
    solution_path: Option<String>,
}

async fn handle_delete_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DeleteImageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    state.require_admin(&headers)?;
    let Json(req) = payload?;
    let path = req
        .image_path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| bad_request("imagePath is required"))?;
    state
        .store
        .assets()
        .delete_asset(&path, AssetClass::Image)
        .await?;
    Ok(message("image deleted"))
}

async fn handle_delete_solution(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DeleteSolutionRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    state.require_admin(&headers)?;
    let Json(req) = payload?;
    let path = req
        .solution_path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| bad_request("solutionPath is required"))?;
    state
        .store
        .assets()
        .delete_asset(&path, AssetClass::Solution)
        .await?;
    Ok(message("solution deleted"))
}

// ============ POST /api/auth/login ============

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
}

/// Handler for `POST /api/auth/login`.
///
/// Returns `401` for a wrong password. With authentication disabled every
/// login succeeds and no token is issued.
async fn handle_login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(req) = payload?;
    let issued = state.auth.login(&req.password)?;
    info!(token_issued = issued.is_some(), "admin login");
    Ok(Json(LoginResponse {
        success: true,
        message: "authenticated".to_string(),
        expires_at: issued.as_ref().map(|t| t.expires_at),
        token: issued.map(|t| t.token),
    }))
}
