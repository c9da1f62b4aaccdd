//! Catalog of uploaded videos: identifier -> storage metadata.
//!
//! `SqliteCatalog` is the durable backend. `MemoryCatalog` keeps records in
//! process and is selected with `database_url = memory`.

use crate::models::video::VideoRecord;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("video `{0}` is already registered")]
    Duplicate(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Storage for `VideoRecord`s.
///
/// Each write is atomic with respect to readers: a record is either fully
/// visible or absent.
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    async fn insert(&self, record: &VideoRecord) -> CatalogResult<()>;

    async fn get(&self, id: Uuid) -> CatalogResult<Option<VideoRecord>>;

    /// Records in upload order.
    async fn list(&self, limit: usize, offset: usize) -> CatalogResult<Vec<VideoRecord>>;

    async fn count(&self) -> CatalogResult<usize>;

    /// Remove a record, returning it if it existed.
    async fn remove(&self, id: Uuid) -> CatalogResult<Option<VideoRecord>>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> CatalogResult<()>;
}

const RECORD_COLUMNS: &str =
    "id, original_filename, stored_filename, size_bytes, content_type, etag, created_at";

#[derive(Clone)]
pub struct SqliteCatalog {
    db: Arc<SqlitePool>,
}

impl SqliteCatalog {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VideoCatalog for SqliteCatalog {
    async fn insert(&self, record: &VideoRecord) -> CatalogResult<()> {
        let result = sqlx::query(
            "INSERT INTO videos (
                id, original_filename, stored_filename, size_bytes,
                content_type, etag, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(&record.original_filename)
        .bind(&record.stored_filename)
        .bind(record.size_bytes)
        .bind(&record.content_type)
        .bind(&record.etag)
        .bind(record.created_at)
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(CatalogError::Duplicate(record.id)),
            Err(err) => Err(CatalogError::Sqlx(err)),
        }
    }

    async fn get(&self, id: Uuid) -> CatalogResult<Option<VideoRecord>> {
        let record = sqlx::query_as::<_, VideoRecord>(&format!(
            "SELECT {} FROM videos WHERE id = ?",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    async fn list(&self, limit: usize, offset: usize) -> CatalogResult<Vec<VideoRecord>> {
        let rows = sqlx::query_as::<_, VideoRecord>(&format!(
            "SELECT {} FROM videos ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?",
            RECORD_COLUMNS
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    async fn count(&self) -> CatalogResult<usize> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM videos")
            .fetch_one(&*self.db)
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn remove(&self, id: Uuid) -> CatalogResult<Option<VideoRecord>> {
        let record = sqlx::query_as::<_, VideoRecord>(&format!(
            "DELETE FROM videos WHERE id = ? RETURNING {}",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    async fn ping(&self) -> CatalogResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}

/// Process-local catalog guarded by an async read/write lock.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    records: Arc<RwLock<HashMap<Uuid, VideoRecord>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoCatalog for MemoryCatalog {
    async fn insert(&self, record: &VideoRecord) -> CatalogResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(CatalogError::Duplicate(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CatalogResult<Option<VideoRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list(&self, limit: usize, offset: usize) -> CatalogResult<Vec<VideoRecord>> {
        let mut all: Vec<VideoRecord> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self) -> CatalogResult<usize> {
        Ok(self.records.read().await.len())
    }

    async fn remove(&self, id: Uuid) -> CatalogResult<Option<VideoRecord>> {
        Ok(self.records.write().await.remove(&id))
    }

    async fn ping(&self) -> CatalogResult<()> {
        Ok(())
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
