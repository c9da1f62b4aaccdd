//! src/services/storage_service.rs
//!
//! StorageService - resolves video identifiers to payload files on local disk
//! and keeps the catalog and the storage directory in step. Payloads live
//! flat beneath `base_path/{id}{ext}`.

use crate::{
    models::video::VideoRecord,
    services::catalog::{CatalogError, VideoCatalog},
};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::fs::{self, File};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("video `{0}` not found")]
    VideoNotFound(Uuid),
    #[error("video `{0}` has no backing file")]
    FileMissing(Uuid),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Where a video's bytes are and how many there are.
#[derive(Debug, Clone)]
pub struct ResolvedVideo {
    pub record: VideoRecord,
    pub path: PathBuf,
    pub length: u64,
}

/// A video opened for reading. The handle stays valid even if the video is
/// deleted while it is held.
#[derive(Debug)]
pub struct OpenedVideo {
    pub record: VideoRecord,
    pub file: File,
    pub length: u64,
}

/// StorageService provides the video storage operations:
/// - Resolve / open a video (catalog lookup plus payload file)
/// - Register a fully written payload
/// - List and count catalog entries
/// - Delete a video (payload file and catalog entry)
#[derive(Clone)]
pub struct StorageService {
    catalog: Arc<dyn VideoCatalog>,

    /// Base directory on disk where video payloads are stored.
    pub base_path: PathBuf,
}

impl StorageService {
    /// Create a new StorageService over `catalog`, using `base_path` as the
    /// root directory for payloads.
    pub fn new(catalog: Arc<dyn VideoCatalog>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            base_path: base_path.into(),
        }
    }

    /// Payload file name for a video: the identifier plus a validated,
    /// lowercased extension. Client supplied names never reach the disk.
    pub fn stored_filename(id: Uuid, extension: &str) -> String {
        format!("{}{}", id, extension)
    }

    /// Fully-qualified payload path for a stored file name.
    pub fn payload_path(&self, stored_filename: &str) -> PathBuf {
        self.base_path.join(stored_filename)
    }

    /// Fetch the catalog record, or `VideoNotFound`.
    pub async fn get(&self, id: Uuid) -> StorageResult<VideoRecord> {
        match self.catalog.get(id).await? {
            Some(record) => Ok(record),
            None => {
                debug!(%id, "unknown video requested");
                Err(StorageError::VideoNotFound(id))
            }
        }
    }

    /// Resolve a video to its payload path and current length.
    pub async fn resolve(&self, id: Uuid) -> StorageResult<ResolvedVideo> {
        let record = self.get(id).await?;
        let path = self.payload_path(&record.stored_filename);
        let meta = fs::metadata(&path)
            .await
            .map_err(|err| missing_file(id, &path, err))?;

        Ok(ResolvedVideo {
            record,
            path,
            length: meta.len(),
        })
    }

    /// Open a video's payload for streaming.
    ///
    /// The length comes from the opened handle, so it describes exactly the
    /// bytes that handle can read.
    pub async fn open(&self, id: Uuid) -> StorageResult<OpenedVideo> {
        let ResolvedVideo { record, path, .. } = self.resolve(id).await?;
        let file = File::open(&path)
            .await
            .map_err(|err| missing_file(id, &path, err))?;
        let length = file.metadata().await?.len();

        if length != record.byte_len() {
            warn!(
                %id,
                catalog = record.size_bytes,
                disk = length,
                "payload size differs from catalog record"
            );
        }

        Ok(OpenedVideo {
            record,
            file,
            length,
        })
    }

    /// Add a record for a payload that is already complete on disk.
    pub async fn register(&self, record: &VideoRecord) -> StorageResult<()> {
        self.catalog.insert(record).await?;
        debug!(id = %record.id, size = record.size_bytes, "registered video");
        Ok(())
    }

    /// A page of records in upload order, plus the total record count.
    pub async fn list(&self, limit: usize, offset: usize) -> StorageResult<(Vec<VideoRecord>, usize)> {
        let total = self.catalog.count().await?;
        let videos = self.catalog.list(limit, offset).await?;
        Ok((videos, total))
    }

    pub async fn count(&self) -> StorageResult<usize> {
        Ok(self.catalog.count().await?)
    }

    /// Catalog connectivity check.
    pub async fn ping(&self) -> StorageResult<()> {
        Ok(self.catalog.ping().await?)
    }

    /// Delete a video's payload and then its catalog entry.
    ///
    /// If the payload cannot be removed the record is kept, so a record never
    /// outlives its payload by accident and the delete can be retried.
    /// Readers that already opened the payload keep reading their handle.
    pub async fn delete(&self, id: Uuid) -> StorageResult<VideoRecord> {
        let record = self.get(id).await?;
        let path = self.payload_path(&record.stored_filename);

        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed payload file {}", path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("payload file {} already missing", path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        match self.catalog.remove(id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(StorageError::VideoNotFound(id)),
            Err(err) => {
                warn!(%id, error = %err, "payload removed but catalog entry remains; retry the delete");
                Err(err.into())
            }
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

fn missing_file(id: Uuid, path: &Path, err: io::Error) -> StorageError {
    if err.kind() == io::ErrorKind::NotFound {
        warn!(%id, "catalog entry has no backing file at {}", path.display());
        StorageError::FileMissing(id)
    } else {
        StorageError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::{CatalogResult, MemoryCatalog};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::AsyncReadExt;

    /// Memory catalog whose next `remove` fails while `fail_remove` is set.
    struct FlakyCatalog {
        inner: MemoryCatalog,
        fail_remove: AtomicBool,
    }

    #[async_trait]
    impl VideoCatalog for FlakyCatalog {
        async fn insert(&self, record: &VideoRecord) -> CatalogResult<()> {
            self.inner.insert(record).await
        }

        async fn get(&self, id: Uuid) -> CatalogResult<Option<VideoRecord>> {
            self.inner.get(id).await
        }

        async fn list(&self, limit: usize, offset: usize) -> CatalogResult<Vec<VideoRecord>> {
            self.inner.list(limit, offset).await
        }

        async fn count(&self) -> CatalogResult<usize> {
            self.inner.count().await
        }

        async fn remove(&self, id: Uuid) -> CatalogResult<Option<VideoRecord>> {
            if self.fail_remove.swap(false, Ordering::SeqCst) {
                return Err(CatalogError::Sqlx(sqlx::Error::PoolClosed));
            }
            self.inner.remove(id).await
        }

        async fn ping(&self) -> CatalogResult<()> {
            self.inner.ping().await
        }
    }

    async fn seeded(dir: &Path, bytes: &[u8]) -> (StorageService, VideoRecord) {
        let service = StorageService::new(Arc::new(MemoryCatalog::new()), dir);
        let id = Uuid::new_v4();
        let record = VideoRecord {
            id,
            original_filename: "holiday.mp4".into(),
            stored_filename: StorageService::stored_filename(id, ".mp4"),
            size_bytes: bytes.len() as i64,
            content_type: "video/mp4".into(),
            etag: format!("{:x}", md5::compute(bytes)),
            created_at: Utc::now(),
        };
        fs::write(service.payload_path(&record.stored_filename), bytes)
            .await
            .unwrap();
        service.register(&record).await.unwrap();
        (service, record)
    }

    #[tokio::test]
    async fn resolve_and_open_report_length() {
        let dir = tempfile::tempdir().unwrap();
        let (service, record) = seeded(dir.path(), b"0123456789").await;

        let resolved = service.resolve(record.id).await.unwrap();
        assert_eq!(resolved.length, 10);
        assert_eq!(resolved.path, dir.path().join(format!("{}.mp4", record.id)));

        let mut opened = service.open(record.id).await.unwrap();
        let mut buf = Vec::new();
        opened.file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(opened.length, 10);
        assert_eq!(buf, b"0123456789");
    }

    #[tokio::test]
    async fn unknown_and_missing_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let (service, record) = seeded(dir.path(), b"abc").await;

        assert!(matches!(
            service.open(Uuid::new_v4()).await,
            Err(StorageError::VideoNotFound(_))
        ));

        fs::remove_file(service.payload_path(&record.stored_filename))
            .await
            .unwrap();
        assert!(matches!(
            service.open(record.id).await,
            Err(StorageError::FileMissing(id)) if id == record.id
        ));
    }

    #[tokio::test]
    async fn delete_removes_payload_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let (service, record) = seeded(dir.path(), b"abc").await;

        let deleted = service.delete(record.id).await.unwrap();
        assert_eq!(deleted.id, record.id);
        assert!(!service.payload_path(&record.stored_filename).exists());
        assert_eq!(service.count().await.unwrap(), 0);
        assert!(matches!(
            service.delete(record.id).await,
            Err(StorageError::VideoNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn open_handle_survives_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (service, record) = seeded(dir.path(), b"still readable").await;

        let mut opened = service.open(record.id).await.unwrap();
        service.delete(record.id).await.unwrap();

        let mut buf = Vec::new();
        opened.file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"still readable");
        assert!(matches!(
            service.open(record.id).await,
            Err(StorageError::VideoNotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_catalog_removal_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(FlakyCatalog {
            inner: MemoryCatalog::new(),
            fail_remove: AtomicBool::new(true),
        });
        let service = StorageService::new(catalog, dir.path());
        let id = Uuid::new_v4();
        let record = VideoRecord {
            id,
            original_filename: "clip.mp4".into(),
            stored_filename: StorageService::stored_filename(id, ".mp4"),
            size_bytes: 3,
            content_type: "video/mp4".into(),
            etag: format!("{:x}", md5::compute(b"abc")),
            created_at: Utc::now(),
        };
        let path = service.payload_path(&record.stored_filename);
        fs::write(&path, b"abc").await.unwrap();
        service.register(&record).await.unwrap();

        assert!(matches!(
            service.delete(id).await,
            Err(StorageError::Catalog(_))
        ));
        assert!(!path.exists());
        assert!(matches!(
            service.open(id).await,
            Err(StorageError::FileMissing(_))
        ));

        let deleted = service.delete(id).await.unwrap();
        assert_eq!(deleted.id, id);
        assert_eq!(service.count().await.unwrap(), 0);
    }
}
