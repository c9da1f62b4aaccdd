//! Upload ingest: validate, copy to disk in fixed chunks, register.
//!
//! A record is registered only after its payload is completely written and
//! renamed into place. Every failure removes whatever was written.

use crate::{
    models::video::VideoRecord,
    services::{
        storage_service::{StorageError, StorageService},
        transfer::CHUNK_SIZE,
    },
};
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use md5::Context;
use std::{io, path::Path, sync::Arc};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tokio_util::io::StreamReader;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid file type; allowed: {allowed}")]
    InvalidFileType { allowed: String },
    #[error("file too large; maximum size is {max_bytes} bytes")]
    FileTooLarge { max_bytes: u64 },
    #[error("upload failed: {0}")]
    UploadFailed(#[from] StorageError),
}

impl From<io::Error> for IngestError {
    fn from(err: io::Error) -> Self {
        IngestError::UploadFailed(StorageError::Io(err))
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Clone)]
pub struct UploadIngest {
    storage: StorageService,
    allowed_extensions: Arc<[String]>,
    max_file_size: u64,
    chunk_size: usize,
}

impl UploadIngest {
    /// `allowed_extensions` are dot-prefixed suffixes, matched case-insensitively.
    pub fn new(storage: StorageService, allowed_extensions: Vec<String>, max_file_size: u64) -> Self {
        let allowed_extensions = allowed_extensions
            .into_iter()
            .map(|ext| ext.to_ascii_lowercase())
            .collect();
        Self {
            storage,
            allowed_extensions,
            max_file_size,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// The allowed extension `filename` ends with, longest match first.
    pub fn validate_extension(&self, filename: &str) -> IngestResult<String> {
        let lowered = filename.to_ascii_lowercase();
        self.allowed_extensions
            .iter()
            .filter(|ext| lowered.ends_with(ext.as_str()))
            .max_by_key(|ext| ext.len())
            .cloned()
            .ok_or_else(|| IngestError::InvalidFileType {
                allowed: self.allowed_extensions.join(", "),
            })
    }

    /// Persist `stream` as a new video named `filename`.
    ///
    /// The extension is checked before the stream is polled. The payload is
    /// written to a hidden temp file, synced, and renamed to `{id}{ext}`.
    pub async fn ingest<S, E>(
        &self,
        filename: &str,
        declared_content_type: Option<&str>,
        stream: S,
    ) -> IngestResult<VideoRecord>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<io::Error>,
    {
        let extension = match self.validate_extension(filename) {
            Ok(ext) => ext,
            Err(err) => {
                info!(filename, "rejected upload with disallowed extension");
                return Err(err);
            }
        };

        let id = Uuid::new_v4();
        let stored_filename = StorageService::stored_filename(id, &extension);
        let final_path = self.storage.payload_path(&stored_filename);
        let tmp_path = self.storage.payload_path(&format!(".tmp-{}", id));
        fs::create_dir_all(self.storage.base_path()).await?;

        let (size_bytes, etag) = match self.copy_to(&tmp_path, stream).await {
            Ok(copied) => copied,
            Err(err) => {
                discard(&tmp_path).await;
                match &err {
                    IngestError::FileTooLarge { .. } => {
                        info!(%id, max = self.max_file_size, "aborted upload over size limit")
                    }
                    other => error!(%id, error = %other, "upload copy failed"),
                }
                return Err(err);
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            discard(&tmp_path).await;
            error!(%id, error = %err, "could not move upload into place");
            return Err(err.into());
        }

        let record = VideoRecord {
            id,
            original_filename: display_name(filename),
            stored_filename,
            size_bytes: size_bytes as i64,
            content_type: pick_content_type(declared_content_type, &extension),
            etag,
            created_at: Utc::now(),
        };

        if let Err(err) = self.storage.register(&record).await {
            discard(&final_path).await;
            error!(%id, error = %err, "could not register upload");
            return Err(err.into());
        }

        info!(%id, size = size_bytes, "stored upload");
        Ok(record)
    }

    /// Copy `stream` into a new file at `path`, `chunk_size` bytes at a time.
    /// Returns the byte count and hex MD5. The file handle is closed on return.
    async fn copy_to<S, E>(&self, path: &Path, stream: S) -> IngestResult<(u64, String)>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<io::Error>,
    {
        let mut reader = StreamReader::new(Box::pin(stream));
        let mut file = File::create(path).await?;
        let mut digest = Context::new();
        let mut size_bytes: u64 = 0;
        let mut chunk = Vec::with_capacity(self.chunk_size);

        loop {
            chunk.clear();
            let read = (&mut reader)
                .take(self.chunk_size as u64)
                .read_to_end(&mut chunk)
                .await?;
            if read == 0 {
                break;
            }

            size_bytes += read as u64;
            if size_bytes > self.max_file_size {
                return Err(IngestError::FileTooLarge {
                    max_bytes: self.max_file_size,
                });
            }

            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        file.sync_all().await?;

        Ok((size_bytes, format!("{:x}", digest.compute())))
    }
}

/// Remove a partially written file, ignoring one that is already gone.
async fn discard(path: &Path) {
    match fs::remove_file(path).await {
        Ok(_) => debug!("removed partial upload {}", path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => error!("failed to remove partial upload {}: {}", path.display(), err),
    }
}

/// Last path component of a client supplied name.
fn display_name(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .to_string()
}

fn pick_content_type(declared: Option<&str>, extension: &str) -> String {
    match declared.map(str::trim) {
        Some(ct) if ct.to_ascii_lowercase().starts_with("video/") => ct.to_string(),
        _ => content_type_for_extension(extension).to_string(),
    }
}

/// MIME type for a dot-prefixed extension.
pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension.trim_start_matches('.') {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "ts" => "video/mp2t",
        _ => "video/mp4",
    }
}
