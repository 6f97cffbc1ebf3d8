//! HTTP API over the record store and ingestion pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload/` | Multipart upload; acknowledges immediately, processing is asynchronous |
//! | `GET`  | `/files/` | List all persisted records |
//! | `GET`  | `/requests/` | Per-batch summaries with ingestion task counts |
//! | `GET`  | `/requests/{request_id}` | Records for one batch (404 if none) |
//! | `GET`  | `/file/{file_id}` | One record by integer primary key (404 if absent) |
//! | `PUT`  | `/file/{file_id}` | Upsert JSON data; returns the computed diff |
//! | `DELETE` | `/delete/` | Delete records by id list; always succeeds |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Explicit 404s for not-found lookups; every other failure surfaces as
//! HTTP 500 with the raw error text as the body. There are no structured
//! error codes.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::llm::{create_analyzer, Analyzer};
use crate::migrate;
use crate::models::{now_store_time, to_display_time, BatchSummary, DocumentRecord};
use crate::pipeline::{spawn_ingest, IngestJob};
use crate::store::RecordStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    store: RecordStore,
    analyzer: Arc<dyn Analyzer>,
}

/// Starts the HTTP server: runs migrations, opens the pool, builds the
/// configured analyzer, and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    migrate::run_migrations(config).await?;

    let pool = db::connect(config).await?;
    let store = RecordStore::new(pool);
    let analyzer = create_analyzer(&config.llm)?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = build_router(store, analyzer)
        .layer(cors)
        .layer(DefaultBodyLimit::max(config.server.max_upload_bytes));

    tracing::info!(bind = %config.server.bind, "docfield server listening");

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router over an existing store and analyzer. Separated from
/// [`run_server`] so tests can drive the API in-process.
pub fn build_router(store: RecordStore, analyzer: Arc<dyn Analyzer>) -> Router {
    let state = AppState { store, analyzer };

    Router::new()
        .route("/upload/", post(handle_upload))
        .route("/files/", get(handle_list_files))
        .route("/requests/", get(handle_list_requests))
        .route("/requests/{request_id}", get(handle_get_request))
        .route(
            "/file/{file_id}",
            get(handle_get_file).put(handle_update_file),
        )
        .route("/delete/", delete(handle_delete_files))
        .route("/health", get(handle_health))
        .with_state(state)
}

// ============ Error response ============

/// Error that converts into the API's plain-text error responses: explicit
/// 404s for lookups, 500 with the raw error text for everything else.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.into().to_string(),
        }
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

// ============ POST /upload/ ============

#[derive(Serialize)]
struct UploadFileInfo {
    file_name: String,
    file_id: String,
    upload_time: String,
}

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    request_id: String,
    file_info: Vec<UploadFileInfo>,
}

/// Accepts a multipart file list, records a pending ingestion task per
/// file, spawns the background pipeline for each, and acknowledges
/// immediately. The response carries no processing outcome.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let request_id = Uuid::new_v4().simple().to_string();
    let upload_time = now_store_time();
    let mut file_info = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await?;
        let file_id = Uuid::new_v4().simple().to_string();
        let extension = file_extension(&file_name);

        state
            .store
            .create_task(&file_id, &request_id, &file_name, &upload_time)
            .await?;

        spawn_ingest(
            state.store.clone(),
            state.analyzer.clone(),
            IngestJob {
                file_name: file_name.clone(),
                extension,
                bytes: bytes.to_vec(),
                request_id: request_id.clone(),
                file_id: file_id.clone(),
                upload_time: upload_time.clone(),
            },
        );

        file_info.push(UploadFileInfo {
            file_name,
            file_id,
            upload_time: to_display_time(&upload_time),
        });
    }

    Ok(Json(UploadResponse {
        message: format!(
            "{} files uploaded. Processing will happen asynchronously.",
            file_info.len()
        ),
        request_id,
        file_info,
    }))
}

/// Lowercase file extension without the leading dot, empty if none.
fn file_extension(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

// ============ GET /files/ ============

async fn handle_list_files(
    State(state): State<AppState>,
) -> Result<Json<Vec<DocumentRecord>>, AppError> {
    let records = state.store.fetch_all().await?;
    Ok(Json(
        records
            .into_iter()
            .map(DocumentRecord::with_display_time)
            .collect(),
    ))
}

// ============ GET /requests/ ============

async fn handle_list_requests(
    State(state): State<AppState>,
) -> Result<Json<Vec<BatchSummary>>, AppError> {
    let summaries = state.store.summarize_by_batch().await?;
    Ok(Json(
        summaries
            .into_iter()
            .map(BatchSummary::with_display_time)
            .collect(),
    ))
}

// ============ GET /requests/{request_id} ============

async fn handle_get_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<Vec<DocumentRecord>>, AppError> {
    let records = state.store.fetch_by_batch(&request_id).await?;
    if records.is_empty() {
        return Err(not_found("No files found for this request_id"));
    }

    Ok(Json(
        records
            .into_iter()
            .map(DocumentRecord::with_display_time)
            .collect(),
    ))
}

// ============ GET /file/{file_id} ============

/// The `file_id` path segment is the store's integer primary key, not the
/// opaque file_id string issued at upload time. Preserved as-is from the
/// original API contract.
async fn handle_get_file(
    State(state): State<AppState>,
    Path(file_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let record = state
        .store
        .fetch_by_id(file_id)
        .await?
        .ok_or_else(|| not_found("File not found"))?;

    Ok(Json(serde_json::json!({
        "file_id": record.id,
        "file_name": record.file_name,
        "json_data": record.json_data,
        "update_count": record.update_count,
        "diff_data": record.diff_data,
    })))
}

// ============ PUT /file/{file_id} ============

async fn handle_update_file(
    State(state): State<AppState>,
    Path(file_id): Path<i64>,
    Json(new_data): Json<Value>,
) -> Result<Json<Value>, AppError> {
    if !new_data.is_object() {
        return Err(bad_request("request body must be a JSON object"));
    }

    let diff = state.store.update_or_insert(file_id, &new_data).await?;

    Ok(Json(serde_json::json!({
        "message": "JSON data updated successfully",
        "updated_data": new_data,
        "diff": diff.unwrap_or_default(),
    })))
}

// ============ DELETE /delete/ ============

#[derive(Deserialize)]
struct DeleteRequest {
    file_ids: Vec<i64>,
}

/// Absent ids are silently ignored; the response reports success either way.
async fn handle_delete_files(
    State(state): State<AppState>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<Value>, AppError> {
    state.store.delete_by_ids(&req.file_ids).await?;

    Ok(Json(serde_json::json!({
        "message": "Selected files deleted successfully"
    })))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_lowercase_extensions() {
        assert_eq!(file_extension("Report.PDF"), "pdf");
        assert_eq!(file_extension("notes.txt"), "txt");
        assert_eq!(file_extension("archive.tar.gz"), "gz");
        assert_eq!(file_extension("no_extension"), "");
    }
}
