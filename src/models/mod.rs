//! Core data models for the video streaming service.
//!
//! Records map to the `videos` table via `sqlx::FromRow` and serialize
//! as JSON via `serde`.

pub mod video;
