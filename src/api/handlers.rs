use std::io;
use std::sync::Arc;

use axum::{body::{Body, Bytes}, extract::{Multipart, Path, Query, State}, http::{header, HeaderMap, StatusCode}, response::{IntoResponse, Response}, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::io::{ReaderStream, SyncIoBridge};
use tracing::{error, info, warn};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::models::media::MediaItem;
use crate::pipeline::scan;
use crate::store::ConfigError;
use crate::utils::path::{base_name, folder_dir, is_safe_segment, resolve_media_url, resolve_relative};
use crate::AppState;

fn failure(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(json!({ "success": false, "error": msg.into() }))).into_response()
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "clients": state.notifier.subscriber_count(),
    })))
}

// ---- background control ----

pub async fn background_next(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("POST /api/background/next");
    state.controller.advance().await;
    Json(state.controller.status().await)
}

pub async fn background_previous(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("POST /api/background/previous");
    state.controller.previous().await;
    Json(state.controller.status().await)
}

pub async fn background_pause(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let is_paused = state.controller.toggle_pause();
    Json(json!({ "isPaused": is_paused }))
}

pub async fn background_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.controller.status().await)
}

/// Body of `POST /api/background/waiting-list`.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum WaitingListCommand {
    Add { item: MediaItem },
    Remove { index: i64 },
}

pub async fn background_waiting_list(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let cmd: WaitingListCommand = match serde_json::from_slice(&body) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!("rejected waiting-list command: {}", e);
            return Json(json!({ "success": false, "error": "Invalid action" }));
        }
    };
    match cmd {
        WaitingListCommand::Add { item } => {
            info!(url = %item.url, "waiting list: add");
            state.controller.add_to_waiting_list(item);
        }
        WaitingListCommand::Remove { index } => {
            // out of range (including negative) is a silent no-op
            if let Ok(index) = usize::try_from(index) {
                state.controller.remove_from_waiting_list(index);
            }
        }
    }
    Json(json!({ "success": true }))
}

// ---- configuration ----

pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.get())
}

pub async fn save_config(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return failure(StatusCode::BAD_REQUEST, "No configuration provided"),
    };
    let cfg = match state.config.update(raw) {
        Ok(cfg) => cfg,
        Err(ConfigError::Invalid(msg)) => return failure(StatusCode::BAD_REQUEST, format!("Invalid configuration format: {}", msg)),
        Err(e) => {
            error!("failed to save configuration: {}", e);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to save configuration: {}", e));
        }
    };
    if let Err(e) = state.controller.reconfigure().await {
        warn!("config saved but controller kept previous settings: {}", e);
    }
    state.notifier.publish_config(cfg);
    Json(json!({ "success": true })).into_response()
}

// ---- local media management ----

pub async fn list_backgrounds(State(state): State<Arc<AppState>>) -> Response {
    let root = state.paths.media_root.clone();
    match tokio::task::spawn_blocking(move || scan::scan(&root)).await {
        Ok(items) => Json(items).into_response(),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn upload_backgrounds(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let mut folder: Option<String> = None;
    let mut files: Vec<(String, Bytes)> = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
        };
        let file_name = field.file_name().map(str::to_owned);
        let field_name = field.name().map(str::to_owned);
        match (file_name, field_name.as_deref()) {
            (Some(name), _) => match field.bytes().await {
                Ok(data) => files.push((name, data)),
                Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
            },
            (None, Some("folder")) => folder = field.text().await.ok(),
            _ => {}
        }
    }
    if files.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "No files uploaded");
    }
    let Some(dir) = folder_dir(&state.paths.media_root, folder.as_deref()) else {
        return failure(StatusCode::BAD_REQUEST, "Invalid folder name");
    };
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        error!("failed to create {}: {}", dir.display(), e);
        return failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload");
    }

    let mut saved = Vec::new();
    for (name, data) in files {
        let Some(safe) = base_name(&name) else {
            warn!(name = %name, "skipping upload with unusable file name");
            continue;
        };
        if let Err(e) = tokio::fs::write(dir.join(safe), &data).await {
            error!("failed to write upload {}: {}", safe, e);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload");
        }
        saved.push(safe.to_string());
    }
    info!(count = saved.len(), folder = folder.as_deref().unwrap_or(scan::ROOT_FOLDER), "stored uploaded backgrounds");
    state.controller.request_refresh();
    Json(json!({ "success": true, "files": saved })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    filename: Option<String>,
    folder: Option<String>,
}

pub async fn delete_background(State(state): State<Arc<AppState>>, Query(q): Query<DeleteQuery>) -> Response {
    let Some(filename) = q.filename.filter(|f| !f.is_empty()) else {
        return failure(StatusCode::BAD_REQUEST, "Filename is required");
    };
    let (Some(safe), Some(dir)) = (base_name(&filename), folder_dir(&state.paths.media_root, q.folder.as_deref())) else {
        return failure(StatusCode::BAD_REQUEST, "Invalid filename or folder");
    };
    match tokio::fs::remove_file(dir.join(safe)).await {
        Ok(()) => {
            info!(file = safe, "deleted background");
            state.controller.request_refresh();
            Json(json!({ "success": true, "message": format!("Deleted {}", safe) })).into_response()
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => failure(StatusCode::NOT_FOUND, "File not found"),
        Err(e) => {
            error!("failed to delete {}: {}", safe, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete file")
        }
    }
}

pub async fn list_folders(State(state): State<Arc<AppState>>) -> Response {
    let root = state.paths.media_root.clone();
    match tokio::task::spawn_blocking(move || scan::list_folders(&root)).await {
        Ok(folders) => Json(folders).into_response(),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameFolderReq {
    old_name: Option<String>,
    new_name: Option<String>,
}

pub async fn rename_folder(State(state): State<Arc<AppState>>, Json(req): Json<RenameFolderReq>) -> Response {
    let (Some(old_name), Some(new_name)) = (
        req.old_name.filter(|s| !s.is_empty()),
        req.new_name.filter(|s| !s.is_empty()),
    ) else {
        return failure(StatusCode::BAD_REQUEST, "oldName and newName are required");
    };
    info!(from = %old_name, to = %new_name, "renaming background folder");
    if !is_safe_segment(&old_name) || !is_safe_segment(&new_name) || old_name == scan::ROOT_FOLDER {
        return failure(StatusCode::BAD_REQUEST, "Invalid folder name");
    }

    let root = &state.paths.media_root;
    let (from, to) = (root.join(&old_name), root.join(&new_name));
    if !tokio::fs::metadata(&from).await.map(|m| m.is_dir()).unwrap_or(false) {
        return failure(StatusCode::NOT_FOUND, "Folder not found");
    }
    if tokio::fs::metadata(&to).await.is_ok() {
        return failure(StatusCode::CONFLICT, "Target folder already exists");
    }
    if let Err(e) = tokio::fs::rename(&from, &to).await {
        error!("failed to rename folder: {}", e);
        return failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to rename folder");
    }

    state.controller.refresh_media().await;
    state.notifier.publish_status(state.controller.snapshot_now());
    Json(json!({
        "success": true,
        "message": format!("Folder renamed from {} to {}", old_name, new_name),
    }))
    .into_response()
}

// ---- export ----

/// `GET /api/export-backgrounds`: every scanned local background in one zip.
/// Entries keep their `<folder>/<file>` path. The archive is written on a
/// blocking thread into a pipe that the response body drains.
pub async fn export_backgrounds(State(state): State<Arc<AppState>>) -> Response {
    info!("GET /api/export-backgrounds");
    let root = state.paths.media_root.clone();
    let (reader, writer) = tokio::io::duplex(64 * 1024);
    let sink = SyncIoBridge::new(writer);
    tokio::task::spawn_blocking(move || match write_archive(&root, sink) {
        Ok(count) => info!(count, "background export finished"),
        Err(e) => warn!("background export aborted: {}", e),
    });
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"backgrounds.zip\""),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response()
}

fn write_archive<W: io::Write>(root: &std::path::Path, out: W) -> anyhow::Result<usize> {
    let mut archive = zip::ZipWriter::new_stream(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut count = 0;
    for item in scan::scan(root) {
        let Some(path) = resolve_media_url(root, &item.url) else {
            continue;
        };
        let mut file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!("skipping {} in export: {}", path.display(), e);
                continue;
            }
        };
        let name = item.url.trim_start_matches(scan::URL_PREFIX);
        archive.start_file(name, options)?;
        io::copy(&mut file, &mut archive)?;
        count += 1;
    }
    archive.finish()?;
    Ok(count)
}

// ---- file serving ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    Full,
    Partial(u64, u64),
    Unsatisfiable,
}

/// Interpret a `Range` header against a file of `file_size` bytes.
/// Anything malformed falls back to the whole file.
pub fn parse_range(range: Option<&str>, file_size: u64) -> ByteRange {
    let Some(ranges) = range.and_then(|r| r.trim().strip_prefix("bytes=")) else {
        return ByteRange::Full;
    };
    let Some((start_str, end_str)) = ranges.split_once('-') else {
        return ByteRange::Full;
    };
    if file_size == 0 {
        return ByteRange::Unsatisfiable;
    }
    let last = file_size - 1;
    if start_str.trim().is_empty() {
        // suffix form: the final `n` bytes
        return match end_str.trim().parse::<u64>() {
            Ok(0) => ByteRange::Unsatisfiable,
            Ok(n) => ByteRange::Partial(file_size.saturating_sub(n), last),
            Err(_) => ByteRange::Full,
        };
    }
    let Ok(start) = start_str.trim().parse::<u64>() else {
        return ByteRange::Full;
    };
    if start >= file_size {
        return ByteRange::Unsatisfiable;
    }
    let end = match end_str.trim() {
        "" => last,
        s => match s.parse::<u64>() {
            Ok(e) => e.min(last),
            Err(_) => return ByteRange::Full,
        },
    };
    if start > end {
        return ByteRange::Full;
    }
    ByteRange::Partial(start, end)
}

const IMMUTABLE: &str = "public, max-age=31536000, immutable";

pub async fn serve_background(State(state): State<Arc<AppState>>, Path(rel): Path<String>, headers: HeaderMap) -> Response {
    let Some(file_path) = resolve_relative(&state.paths.media_root, &rel) else {
        return failure(StatusCode::NOT_FOUND, "Background not found");
    };
    let file_size = match tokio::fs::metadata(&file_path).await {
        Ok(m) if m.is_file() => m.len(),
        _ => return failure(StatusCode::NOT_FOUND, "Background not found"),
    };
    let mime = mime_guess::from_path(&file_path).first_or_octet_stream().to_string();
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    match parse_range(range, file_size) {
        ByteRange::Unsatisfiable => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{}", file_size))],
        )
            .into_response(),
        ByteRange::Partial(start, end) => {
            let len = end - start + 1;
            let body = match open_slice(&file_path, start, len).await {
                Ok(body) => body,
                Err(e) => {
                    error!("failed to open range of {}: {}", file_path.display(), e);
                    return failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file");
                }
            };
            (
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, mime),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                    (header::CACHE_CONTROL, IMMUTABLE.to_string()),
                    (header::CONTENT_LENGTH, len.to_string()),
                    (header::CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, file_size)),
                ],
                body,
            )
                .into_response()
        }
        ByteRange::Full => match open_slice(&file_path, 0, file_size).await {
            Ok(body) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                    (header::CACHE_CONTROL, IMMUTABLE.to_string()),
                    (header::CONTENT_LENGTH, file_size.to_string()),
                ],
                body,
            )
                .into_response(),
            Err(e) => {
                error!("failed to open {}: {}", file_path.display(), e);
                failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file")
            }
        },
    }
}

/// Stream `len` bytes of `path` starting at `start`.
async fn open_slice(path: &std::path::Path, start: u64, len: u64) -> io::Result<Body> {
    use tokio::io::{AsyncReadExt, AsyncSeekExt};
    let mut file = tokio::fs::File::open(path).await?;
    if start > 0 {
        file.seek(io::SeekFrom::Start(start)).await?;
    }
    Ok(Body::from_stream(ReaderStream::new(file.take(len))))
}

// ---- system info ----

pub async fn system_info() -> Response {
    let info = tokio::task::spawn_blocking(|| {
        use sysinfo::System;
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        let cores = sys.cpus().len().max(1);
        let model = sys.cpus().first().map(|c| c.brand().trim().to_string()).unwrap_or_default();
        let load = System::load_average();
        let usage = ((load.one / cores as f64) * 100.0).round().min(100.0);

        let total = sys.total_memory();
        let free = sys.available_memory();
        let used = total.saturating_sub(free);
        let percentage = if total > 0 { (used as f64 / total as f64 * 100.0).round() } else { 0.0 };

        json!({
            "cpu": {
                "usage": usage,
                "cores": cores,
                "model": model,
                "loadAvg": [load.one, load.five, load.fifteen],
            },
            "memory": { "total": total, "free": free, "used": used, "percentage": percentage },
            "uptime": System::uptime(),
            "os": {
                "platform": std::env::consts::OS,
                "release": System::kernel_version().unwrap_or_default(),
                "hostname": System::host_name().unwrap_or_default(),
            },
        })
    })
    .await;
    match info {
        Ok(v) => Json(v).into_response(),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
