//! Health & readiness handlers.
//!
//! - GET /health  -> liveness plus the number of catalogued videos
//! - GET /readyz  -> readiness that checks the catalog and disk I/O

use crate::{errors::AppError, services::storage_service::StorageService, state::AppState};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::BTreeMap, path::Path};
use tokio::fs;
use uuid::Uuid;

const PROBE_CONTENT: &[u8] = b"readyz";

/// `GET /health`
///
/// Liveness probe. No authentication.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let videos_count = state.storage.count().await?;
    Ok(Json(HealthResponse {
        status: "healthy".into(),
        timestamp: Utc::now(),
        videos_count,
    }))
}

/// `GET /readyz`
///
/// 200 when the catalog answers and the storage directory round-trips a
/// small file, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let checks = BTreeMap::from([
        ("catalog", CheckStatus::from(catalog_check(&state.storage).await)),
        ("disk", CheckStatus::from(disk_check(state.storage.base_path()).await)),
    ]);
    let ready = checks.values().all(|check| check.ok);
    if !ready {
        tracing::warn!(?checks, "readiness check failed");
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadyResponse {
        status: if ready { "ok" } else { "error" },
        checks,
    };
    (status, Json(body))
}

async fn catalog_check(storage: &StorageService) -> Result<(), String> {
    storage.ping().await.map_err(|e| format!("error: {}", e))
}

/// Write, read back and remove a probe file in the storage directory.
async fn disk_check(dir: &Path) -> Result<(), String> {
    let probe = dir.join(format!(".readyz-{}", Uuid::new_v4()));
    fs::write(&probe, PROBE_CONTENT)
        .await
        .map_err(|e| format!("could not write probe file: {}", e))?;

    let read = fs::read(&probe).await;
    let removed = fs::remove_file(&probe).await;
    match read {
        Ok(bytes) if bytes == PROBE_CONTENT => {}
        Ok(_) => return Err("probe file content mismatch".into()),
        Err(e) => return Err(format!("could not read probe file: {}", e)),
    }
    removed.map_err(|e| format!("could not remove probe file: {}", e))
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: DateTime<Utc>,
    videos_count: usize,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Debug, Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl From<Result<(), String>> for CheckStatus {
    fn from(result: Result<(), String>) -> Self {
        Self {
            ok: result.is_ok(),
            error: result.err(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disk_check_leaves_no_probe_behind() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(disk_check(dir.path()).await, Ok(()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn disk_check_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let err = disk_check(&missing).await.unwrap_err();
        assert!(err.starts_with("could not write probe file"), "{err}");
    }

    #[test]
    fn check_status_carries_error() {
        let failed = CheckStatus::from(Err::<(), _>("boom".to_string()));
        assert!(!failed.ok);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(CheckStatus::from(Ok(())).ok);
    }
}
