use crate::services::{
    catalog::CatalogError, ingest::IngestError, range::RangeError, storage_service::StorageError,
};
use axum::{
    Json,
    extract::{multipart::MultipartRejection, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// An HTTP-facing error: status, stable taxonomy code, and a client-safe message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, code and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error. The detail is logged, not returned.
    pub fn internal(detail: impl fmt::Display) -> Self {
        tracing::error!("internal error: {}", detail);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal",
            "internal server error",
        )
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NotFound", msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", msg)
    }

    pub fn bad_request(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, msg)
    }

    pub fn range_not_satisfiable(total: u64) -> Self {
        Self::new(
            StatusCode::RANGE_NOT_SATISFIABLE,
            "RangeNotSatisfiable",
            format!("requested range not satisfiable for {} bytes", total),
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "code": self.code,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            // Unknown id and missing payload look the same to clients; the
            // storage layer logs them at different levels.
            StorageError::VideoNotFound(_) | StorageError::FileMissing(_) => {
                AppError::not_found("video not found")
            }
            other => AppError::internal(other),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        AppError::internal(err)
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::InvalidFileType { .. } => {
                AppError::bad_request("InvalidFileType", err.to_string())
            }
            IngestError::FileTooLarge { .. } => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, "FileTooLarge", err.to_string())
            }
            IngestError::UploadFailed(source) => {
                tracing::error!("upload failed: {}", source);
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "UploadFailed",
                    "upload failed",
                )
            }
        }
    }
}

impl From<RangeError> for AppError {
    fn from(err: RangeError) -> Self {
        match err {
            RangeError::NotSatisfiable { total } => AppError::range_not_satisfiable(total),
            RangeError::Malformed(reason) => {
                AppError::bad_request("MalformedRange", format!("malformed range header: {}", reason))
            }
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::bad_request("InvalidQuery", rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::bad_request("InvalidMultipart", rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn storage_not_found_variants_collapse_to_404() {
        let unknown: AppError = StorageError::VideoNotFound(Uuid::new_v4()).into();
        let missing: AppError = StorageError::FileMissing(Uuid::new_v4()).into();
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(unknown.message, missing.message);
    }

    #[test]
    fn ingest_errors_map_to_taxonomy() {
        let invalid: AppError = IngestError::InvalidFileType {
            allowed: ".mp4".into(),
        }
        .into();
        assert_eq!((invalid.status, invalid.code), (StatusCode::BAD_REQUEST, "InvalidFileType"));

        let large: AppError = IngestError::FileTooLarge { max_bytes: 1 }.into();
        assert_eq!(
            (large.status, large.code),
            (StatusCode::PAYLOAD_TOO_LARGE, "FileTooLarge")
        );

        let io = std::io::Error::other("/srv/videos/secret path");
        let failed: AppError = IngestError::from(io).into();
        assert_eq!(failed.code, "UploadFailed");
        assert!(!failed.message.contains("/srv"));
    }
}
