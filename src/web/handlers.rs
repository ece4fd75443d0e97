//! Request handlers for the download API.
//!
//! Error convention: input and lookup failures on `/api/*` endpoints answer
//! 200 with `success: false` (the contract the web client was built
//! against); only file delivery uses real status codes.

use std::path::Path;

use axum::body::Body;
use axum::extract::{Path as PathParam, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;
use url::Url;

use crate::core::config;
use crate::core::utils::format_duration;
use crate::download::task::{MediaType, TaskKind, TaskState};
use crate::download::worker::spawn_worker;
use crate::download::ytdlp;
use crate::web::error::HttpError;
use crate::web::state::AppState;

/// Body of POST /api/info and POST /api/download.
#[derive(Debug, Deserialize)]
pub struct InfoRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_format_id")]
    pub format_id: String,
    #[serde(default = "default_format_type")]
    pub format_type: String,
    #[serde(default)]
    pub is_playlist: bool,
}

fn default_format_id() -> String {
    "best".to_string()
}

fn default_format_type() -> String {
    "video".to_string()
}

/// 200 + `success: false` error body.
fn failure(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "success": false, "error": message.into() }))
}

/// Validates a request URL; answers with the rejection reason on failure.
fn parse_request_url(raw: &str) -> Result<Url, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("Please provide a media URL".to_string());
    }
    if trimmed.len() > config::validation::MAX_URL_LENGTH {
        return Err("URL is too long".to_string());
    }
    Url::parse(trimmed).map_err(|e| format!("Invalid URL: {}", e))
}

/// POST /api/info — metadata for a URL, without downloading.
pub async fn info(Json(req): Json<InfoRequest>) -> Json<Value> {
    let url = match parse_request_url(&req.url) {
        Ok(url) => url,
        Err(message) => return failure(message),
    };

    let info = match ytdlp::fetch_media_info(&url).await {
        Ok(info) => info,
        Err(e) => {
            log::warn!("Info fetch failed for {}: {}", url, e);
            return failure(format!("Failed to fetch media info: {}", e));
        }
    };

    let is_playlist = info.is_playlist || url.as_str().contains("playlist");

    if is_playlist {
        return Json(json!({
            "success": true,
            "type": "playlist",
            "title": info.title,
            "thumbnail": info.thumbnail.unwrap_or_default(),
            "video_count": info.entry_count,
            "uploader": info.uploader.unwrap_or_default(),
            "url": url.as_str(),
        }));
    }

    let formats: Vec<Value> = info
        .formats
        .iter()
        .map(|f| {
            json!({
                "format_id": f.format_id,
                "ext": f.ext,
                "resolution": f.resolution,
                "filesize": f.filesize,
                "format_note": f.format_note,
            })
        })
        .collect();

    Json(json!({
        "success": true,
        "type": "video",
        "title": info.title,
        "thumbnail": info.thumbnail.unwrap_or_default(),
        "duration": info.duration_secs.map(format_duration).unwrap_or_default(),
        "uploader": info.uploader.unwrap_or_default(),
        "view_count": info.view_count,
        "formats": formats,
        "url": url.as_str(),
    }))
}

/// POST /api/download — registers a task and spawns its worker.
pub async fn start_download(State(state): State<AppState>, Json(req): Json<DownloadRequest>) -> Json<Value> {
    let url = match parse_request_url(&req.url) {
        Ok(url) => url,
        Err(message) => return failure(message),
    };

    let kind = if req.is_playlist {
        TaskKind::Playlist
    } else {
        TaskKind::Single
    };
    let media_type = MediaType::parse(&req.format_type);

    let task_id = state
        .registry
        .create(url.as_str(), kind, media_type, &req.format_id)
        .await;

    // Fire-and-forget: the worker owns the task from here
    spawn_worker(
        state.registry.clone(),
        state.notifier.clone(),
        state.history.clone(),
        task_id.clone(),
    );

    Json(json!({ "success": true, "task_id": task_id }))
}

/// GET /api/status/:task_id — current task record fields.
pub async fn status(State(state): State<AppState>, PathParam(task_id): PathParam<String>) -> Json<Value> {
    let Some(record) = state.registry.get(&task_id).await else {
        return failure("Task not found");
    };

    Json(json!({
        "success": true,
        "status": record.state.as_str(),
        "progress": record.percent,
        "speed": record.speed,
        "eta": record.eta,
        "filename": record.output_path.unwrap_or_default(),
        "title": record.title,
        "current_item": record.current_item,
        "total_items": record.total_items,
        "error": record.error_message,
    }))
}

/// GET /download/:task_id — streams the completed file as an attachment.
pub async fn download_file(
    State(state): State<AppState>,
    PathParam(task_id): PathParam<String>,
) -> Result<Response, HttpError> {
    let record = state
        .registry
        .get(&task_id)
        .await
        .ok_or_else(|| HttpError::NotFound("File is not available".to_string()))?;

    if record.state != TaskState::Completed {
        return Err(HttpError::NotFound("File is not available".to_string()));
    }

    let path = record
        .output_path
        .ok_or_else(|| HttpError::NotFound("File not found".to_string()))?;

    if !Path::new(&path).exists() {
        return Err(HttpError::NotFound("File not found".to_string()));
    }

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| HttpError::Internal(format!("Failed to open file: {}", e)))?;

    let filename = Path::new(&path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());

    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

/// GET /api/cancel/:task_id — flags advisory cancellation; always succeeds.
pub async fn cancel(State(state): State<AppState>, PathParam(task_id): PathParam<String>) -> Json<Value> {
    state.registry.request_cancel(&task_id).await;
    Json(json!({ "success": true }))
}

/// GET /api/history — the bounded log, newest first.
pub async fn history(State(state): State<AppState>) -> Json<Value> {
    let entries = state.history.load().await;
    Json(json!({ "success": true, "history": entries }))
}

/// DELETE /api/history — clears the log.
pub async fn clear_history(State(state): State<AppState>) -> Json<Value> {
    match state.history.clear().await {
        Ok(()) => Json(json!({ "success": true })),
        Err(e) => {
            log::error!("Failed to clear history: {}", e);
            failure(format!("Failed to clear history: {}", e))
        }
    }
}

/// GET /api/queue — tasks partitioned into active and pending.
///
/// "pending" holds every non-downloading state, terminal ones included;
/// existing clients rely on that partition.
pub async fn queue(State(state): State<AppState>) -> Json<Value> {
    let mut active = Vec::new();
    let mut pending = Vec::new();

    for record in state.registry.list().await {
        let item = json!({
            "task_id": record.id,
            "title": record.display_title(),
            "status": record.state.as_str(),
            "progress": record.percent,
        });

        if record.state == TaskState::Downloading {
            active.push(item);
        } else {
            pending.push(item);
        }
    }

    Json(json!({ "success": true, "queue": { "active": active, "pending": pending } }))
}

/// GET /api/events — SSE stream of download_progress events.
pub async fn events(State(state): State<AppState>) -> impl IntoResponse {
    state.notifier.sse_stream()
}

/// GET /health — simple health check.
pub async fn health() -> &'static str {
    "ok"
}
