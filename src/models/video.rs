//! Represents an uploaded video and where its bytes live.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Catalog entry for one uploaded video.
///
/// Created by upload ingest once the payload is completely on disk and
/// removed together with the payload on delete. Never mutated in between.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct VideoRecord {
    /// Opaque identifier generated at ingest time.
    #[serde(rename = "video_id")]
    pub id: Uuid,

    /// Filename as declared by the uploading client. Display only.
    pub original_filename: String,

    /// Name of the payload file inside the storage directory (`{id}{ext}`).
    pub stored_filename: String,

    /// Size in bytes.
    #[serde(rename = "size")]
    pub size_bytes: i64,

    /// MIME type served on stream responses.
    pub content_type: String,

    /// Hex MD5 of the payload.
    pub etag: String,

    #[serde(rename = "uploaded_at")]
    pub created_at: DateTime<Utc>,
}

impl VideoRecord {
    /// Size as an unsigned byte count.
    pub fn byte_len(&self) -> u64 {
        self.size_bytes.max(0) as u64
    }
}
