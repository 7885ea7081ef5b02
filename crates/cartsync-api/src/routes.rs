use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Extension, Json, Router};
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use cartsync_core::models::{
    Device, DeviceId, SaveId, SaveLocation, SaveLocationId, SaveVersionId, SyncAction, SyncLog,
    SyncMode, SyncStatus, SyncStrategy,
};
use cartsync_core::reconcile::{ManifestEntry, RawTimestamp, SkipReason};
use cartsync_core::services::{SyncService, UploadOutcome, UploadRequest};

use crate::auth::extract_api_key;
use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    service: SyncService,
}

impl AppState {
    #[must_use]
    pub fn new(config: Arc<AppConfig>, service: SyncService) -> Self {
        Self { config, service }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/sync/upload", post(upload))
        .route("/sync/manifest", get(manifest))
        .route("/sync/download", get(download))
        .route("/sync/heartbeat", post(heartbeat))
        .route("/sync/logs", get(list_logs).post(record_log))
        .route("/saves", get(list_saves).delete(delete_save))
        .route("/saves/sync-strategy", patch(set_sync_strategy))
        .route("/saves/sync-mode", patch(set_sync_mode))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_device_auth,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

async fn require_device_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = extract_api_key(request.headers())?;
    let device = state
        .service
        .authenticate_device(api_key)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid API key"))?;
    request.extensions_mut().insert(device);
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
struct UploadBody {
    file_path: String,
    file_size: Option<u64>,
    action: String,
    file_content: String,
    local_path: Option<String>,
    local_modified_at: Option<RawTimestamp>,
    save_key: Option<String>,
    content_hash: Option<String>,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: String,
    uploaded: bool,
    skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    save_id: Option<SaveId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    save_version_id: Option<SaveVersionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage_key: Option<String>,
}

async fn upload(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    Json(body): Json<UploadBody>,
) -> Result<Json<UploadResponse>, AppError> {
    if body.file_path.trim().is_empty() {
        return Err(AppError::bad_request("file_path is required"));
    }
    if body.action != "upload" {
        return Err(AppError::bad_request("action must be \"upload\""));
    }
    let bytes = decode_file_content(&body.file_content, state.config.max_upload_bytes)?;

    let outcome = state
        .service
        .upload(
            &device,
            UploadRequest {
                file_path: body.file_path,
                file_size: body.file_size,
                bytes,
                local_path: body.local_path,
                local_modified_at: body.local_modified_at,
                save_key: body.save_key,
                content_hash: body.content_hash,
            },
        )
        .await?;

    let response = match outcome {
        UploadOutcome::Uploaded { version } => UploadResponse {
            message: "File uploaded and indexed successfully".to_string(),
            uploaded: true,
            skipped: false,
            save_id: Some(version.save_id),
            save_version_id: Some(version.id),
            content_hash: Some(version.content_hash),
            storage_key: Some(version.storage_key),
        },
        UploadOutcome::Skipped {
            save_id,
            reason,
            existing_version_id,
            content_hash,
        } => UploadResponse {
            message: skip_message(reason).to_string(),
            uploaded: false,
            skipped: true,
            save_id: Some(save_id),
            save_version_id: existing_version_id,
            content_hash: Some(content_hash),
            storage_key: None,
        },
        UploadOutcome::StorageFailed { save_id } => UploadResponse {
            message: "File sync logged (upload may have failed)".to_string(),
            uploaded: false,
            skipped: false,
            save_id: Some(save_id),
            save_version_id: None,
            content_hash: None,
            storage_key: None,
        },
    };
    Ok(Json(response))
}

/// Device-facing message for each skip outcome
const fn skip_message(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::SyncDisabled => "Upload skipped - sync disabled for this save",
        SkipReason::ContentExists => "Path registered - content already exists",
        SkipReason::OlderThanExisting { .. } => {
            "Upload skipped - file is older than existing version"
        }
        SkipReason::Unchanged => "Upload skipped - content unchanged",
    }
}

fn decode_file_content(encoded: &str, max_bytes: usize) -> Result<Vec<u8>, AppError> {
    if encoded.is_empty() {
        return Err(AppError::bad_request("file_content is required"));
    }
    // Base64 expands by 4/3; reject clearly-oversized payloads before decoding
    if encoded.len() > max_bytes / 3 * 4 + 4 {
        return Err(AppError::bad_request("file_content exceeds upload limit"));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| AppError::bad_request("file_content must be valid base64"))?;
    if bytes.len() > max_bytes {
        return Err(AppError::bad_request("file_content exceeds upload limit"));
    }
    Ok(bytes)
}

#[derive(Debug, Serialize)]
struct DeviceSummary {
    id: DeviceId,
    device_type: String,
}

#[derive(Debug, Serialize)]
struct ManifestResponse {
    device: DeviceSummary,
    manifest: Vec<ManifestEntry>,
    count: usize,
    mapped_count: usize,
    unmapped_count: usize,
}

async fn manifest(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> Result<Json<ManifestResponse>, AppError> {
    let manifest = state.service.build_manifest(&device).await?;
    Ok(Json(ManifestResponse {
        device: DeviceSummary {
            id: device.id,
            device_type: device.device_type,
        },
        count: manifest.entries.len(),
        mapped_count: manifest.mapped_count,
        unmapped_count: manifest.unmapped_count,
        manifest: manifest.entries,
    }))
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    save_version_id: String,
}

async fn download(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let version_id: SaveVersionId = query
        .save_version_id
        .parse()
        .map_err(|_| AppError::bad_request("save_version_id must be a valid id"))?;

    let payload = state
        .service
        .download(&device, &version_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Save version not found".to_string()))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    insert_header(&mut headers, "x-save-id", &payload.version.save_id.as_str())?;
    insert_header(
        &mut headers,
        "x-save-version-id",
        &payload.version.id.as_str(),
    )?;
    insert_header(&mut headers, "x-save-hash", &payload.version.content_hash)?;
    insert_header(
        &mut headers,
        "x-save-local-modified-at",
        &payload.version.local_modified_at.to_string(),
    )?;
    insert_header(
        &mut headers,
        "x-save-uploaded-at",
        &payload.version.uploaded_at.to_string(),
    )?;

    Ok((headers, payload.bytes).into_response())
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), AppError> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| AppError::Internal(format!("invalid header value for {name}")))?;
    headers.insert(name, value);
    Ok(())
}

#[derive(Debug, Serialize)]
struct HeartbeatResponse {
    status: &'static str,
    timestamp: i64,
}

async fn heartbeat(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> Result<Json<HeartbeatResponse>, AppError> {
    state.service.heartbeat(&device).await?;
    Ok(Json(HeartbeatResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    device_id: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    logs: Vec<SyncLog>,
    total: u64,
    limit: usize,
    offset: usize,
}

async fn list_logs(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, AppError> {
    let device_filter = query
        .device_id
        .map(|raw| {
            raw.parse::<DeviceId>()
                .map_err(|_| AppError::bad_request("device_id must be a valid id"))
        })
        .transpose()?;
    let limit = query
        .limit
        .unwrap_or(state.config.log_page_size)
        .clamp(1, 500);
    let offset = query.offset.unwrap_or(0);

    let (logs, total) = state
        .service
        .list_logs(&device.user_id, device_filter, limit, offset)
        .await?;
    Ok(Json(LogsResponse {
        logs,
        total,
        limit,
        offset,
    }))
}

#[derive(Debug, Deserialize)]
struct RecordLogBody {
    action: SyncAction,
    file_path: String,
    file_size: Option<u64>,
    status: SyncStatus,
    error_msg: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecordLogResponse {
    log_id: String,
    created_at: i64,
}

async fn record_log(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    Json(body): Json<RecordLogBody>,
) -> Result<Json<RecordLogResponse>, AppError> {
    if body.file_path.trim().is_empty() {
        return Err(AppError::bad_request("file_path is required"));
    }

    let mut log = SyncLog::new(device.id, body.action, body.file_path, body.status);
    if let Some(file_size) = body.file_size {
        log = log.with_file_size(file_size);
    }
    if let Some(error_msg) = body.error_msg {
        log = log.with_error(error_msg);
    }
    state.service.record_client_event(&log).await?;

    Ok(Json(RecordLogResponse {
        log_id: log.id,
        created_at: log.created_at,
    }))
}

#[derive(Debug, Serialize)]
struct SavesResponse {
    saves: Vec<cartsync_core::services::SaveOverview>,
    count: usize,
}

async fn list_saves(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> Result<Json<SavesResponse>, AppError> {
    let saves = state.service.list_saves(&device.user_id).await?;
    Ok(Json(SavesResponse {
        count: saves.len(),
        saves,
    }))
}

#[derive(Debug, Deserialize)]
struct DeleteSaveBody {
    save_id: String,
}

#[derive(Debug, Serialize)]
struct DeleteSaveResponse {
    deleted: bool,
    save_id: SaveId,
}

async fn delete_save(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    Json(body): Json<DeleteSaveBody>,
) -> Result<Json<DeleteSaveResponse>, AppError> {
    let save_id: SaveId = body
        .save_id
        .parse()
        .map_err(|_| AppError::bad_request("save_id must be a valid id"))?;

    state.service.delete_save(&device.user_id, &save_id).await?;
    Ok(Json(DeleteSaveResponse {
        deleted: true,
        save_id,
    }))
}

#[derive(Debug, Deserialize)]
struct SetSyncStrategyBody {
    save_id: String,
    sync_strategy: SyncStrategy,
}

#[derive(Debug, Serialize)]
struct SetSyncStrategyResponse {
    save: cartsync_core::models::Save,
}

async fn set_sync_strategy(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    Json(body): Json<SetSyncStrategyBody>,
) -> Result<Json<SetSyncStrategyResponse>, AppError> {
    let save_id: SaveId = body
        .save_id
        .parse()
        .map_err(|_| AppError::bad_request("save_id must be a valid id"))?;

    let save = state
        .service
        .set_sync_strategy(&device.user_id, &save_id, body.sync_strategy)
        .await?;
    Ok(Json(SetSyncStrategyResponse { save }))
}

#[derive(Debug, Deserialize)]
struct SetSyncModeBody {
    save_location_id: String,
    sync_mode: SyncMode,
}

#[derive(Debug, Serialize)]
struct SetSyncModeResponse {
    save_location: SaveLocation,
}

async fn set_sync_mode(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    Json(body): Json<SetSyncModeBody>,
) -> Result<Json<SetSyncModeResponse>, AppError> {
    let location_id: SaveLocationId = body
        .save_location_id
        .parse()
        .map_err(|_| AppError::bad_request("save_location_id must be a valid id"))?;

    let save_location = state
        .service
        .set_sync_mode(&device.user_id, &location_id, body.sync_mode)
        .await?;
    Ok(Json(SetSyncModeResponse { save_location }))
}
