//! `X-API-Key` check for management endpoints.

use crate::{errors::AppError, state::AppState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Constant-time comparison of two strings to prevent timing attacks on API key validation.
fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Reject requests whose `X-API-Key` header is missing or wrong.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    let rejection = match provided {
        Some(key) if secure_compare(key, &state.config.api_key) => None,
        Some(_) => Some("invalid API key"),
        None => Some("missing X-API-Key header"),
    };

    match rejection {
        None => next.run(request).await,
        Some(reason) => {
            tracing::info!(path = %request.uri().path(), reason, "rejected unauthenticated request");
            AppError::unauthorized(reason).into_response()
        }
    }
}
