//! HTTP handlers for upload, streaming, and catalog management.
//! Upload and stream bodies flow through in fixed-size chunks and are never
//! buffered whole; storage concerns are delegated to the services.

use crate::{
    errors::AppError,
    models::video::VideoRecord,
    services::{
        framer::{Framing, unsatisfiable_response},
        range::{RangeError, parse_range},
        transfer::ChunkedTransfer,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::MultipartRejection, rejection::QueryRejection,
    },
    http::{HeaderMap, header},
    response::Response,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const MAX_PAGE_SIZE: usize = 1000;

/// Query params accepted by `GET /videos`.
#[derive(Debug, Deserialize)]
pub struct ListVideosQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub video_id: Uuid,
    pub stream_url: String,
    pub filename: String,
    pub size: i64,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListVideosResponse {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub videos: Vec<VideoRecord>,
}

/// `GET /` - service index.
pub async fn index() -> Json<Value> {
    Json(json!({
        "service": "Video Streaming Service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /upload",
            "stream": "GET /stream/{video_id}",
            "info": "GET /video/{video_id}",
            "list": "GET /videos",
            "delete": "DELETE /video/{video_id}",
            "health": "GET /health"
        },
        "note": "upload, info, list and delete require the X-API-Key header"
    }))
}

/// `POST /upload` - multipart upload; the first part carrying a filename is
/// stored.
pub async fn upload_video(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request("InvalidMultipart", err.body_text()))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            debug!(name = ?field.name(), "skipping multipart field without filename");
            continue;
        };
        let content_type = field.content_type().map(str::to_string);

        let stream = field.map(|chunk| chunk.map_err(io::Error::other));
        let record = state
            .ingest
            .ingest(&filename, content_type.as_deref(), stream)
            .await?;

        return Ok(Json(UploadResponse {
            success: true,
            video_id: record.id,
            stream_url: state.stream_url(&record.id),
            filename: record.original_filename,
            size: record.size_bytes,
            message: "Video uploaded successfully".into(),
        }));
    }

    Err(AppError::bad_request(
        "MissingFile",
        "multipart body contains no file part",
    ))
}

/// `GET /stream/{video_id}` - stream a video, honoring `Range`.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let id = parse_video_id(&video_id)?;
    let opened = state.storage.open(id).await?;

    // A header that is not visible ASCII cannot be a valid range.
    let range_header = headers
        .get(header::RANGE)
        .map(|value| value.to_str().unwrap_or_default());

    let request = match parse_range(range_header, opened.length, state.range_policy()) {
        Ok(request) => request,
        Err(RangeError::NotSatisfiable { total }) => {
            info!(%id, range = ?range_header, total, "unsatisfiable range");
            return Ok(unsatisfiable_response(total));
        }
        Err(err) => return Err(err.into()),
    };

    let framing = Framing::new(request, opened.length);
    let transfer = ChunkedTransfer::open(opened.file, framing.plan())
        .await
        .map_err(AppError::internal)?;
    debug!(%id, ?framing, "streaming video");

    Ok(framing.into_response(&opened.record, transfer.into_stream()))
}

/// `GET /video/{video_id}` - catalog record.
pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<VideoRecord>, AppError> {
    let id = parse_video_id(&video_id)?;
    Ok(Json(state.storage.get(id).await?))
}

/// `GET /videos?limit=&offset=` - page through the catalog in upload order.
pub async fn list_videos(
    State(state): State<AppState>,
    query: Result<Query<ListVideosQuery>, QueryRejection>,
) -> Result<Json<ListVideosResponse>, AppError> {
    let Query(q) = query?;
    let limit = q.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = q.offset.unwrap_or(0);
    let (videos, total) = state.storage.list(limit, offset).await?;

    Ok(Json(ListVideosResponse {
        total,
        limit,
        offset,
        videos,
    }))
}

/// `DELETE /video/{video_id}` - remove payload and record.
pub async fn delete_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_video_id(&video_id)?;
    let record = state.storage.delete(id).await?;
    info!(id = %record.id, "deleted video");

    Ok(Json(json!({
        "success": true,
        "message": "Video deleted successfully",
        "video_id": record.id
    })))
}

/// Identifiers are UUIDs; anything else cannot name a video.
fn parse_video_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| {
        debug!(video_id = raw, "malformed video id");
        AppError::not_found("video not found")
    })
}
