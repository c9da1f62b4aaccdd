//! Defines routes for the video upload and streaming API.
//!
//! ## Structure
//! - **Public endpoints**
//!   - `GET    /`                  - service index
//!   - `GET    /health`            - liveness + record count
//!   - `GET    /readyz`            - catalog and disk readiness
//!   - `GET    /stream/{video_id}` - byte-range streaming (playback URLs are shared as-is)
//!
//! - **Management endpoints** (require `X-API-Key`)
//!   - `POST   /upload`            - multipart upload
//!   - `GET    /videos`            - paginated listing
//!   - `GET    /video/{video_id}`  - record lookup
//!   - `DELETE /video/{video_id}`  - delete payload and record

use crate::{
    auth::require_api_key,
    handlers::{
        health_handlers::{health, readyz},
        video_handlers::{
            delete_video, get_video, index, list_videos, stream_video, upload_video,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the application router with shared state attached.
///
/// The request body limit is lifted on `/upload`; ingest enforces the
/// configured maximum while it streams.
pub fn routes(state: AppState) -> Router {
    let management = Router::new()
        .route(
            "/upload",
            post(upload_video).layer(DefaultBodyLimit::disable()),
        )
        .route("/videos", get(list_videos))
        .route("/video/{video_id}", get(get_video).delete(delete_video))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/stream/{video_id}", get(stream_video))
        .merge(management)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
