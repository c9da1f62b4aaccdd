//! Shared handler state.

use crate::{
    config::AppConfig,
    db,
    services::{
        catalog::{MemoryCatalog, SqliteCatalog, VideoCatalog},
        ingest::UploadIngest,
        range::MalformedRangePolicy,
        storage_service::StorageService,
    },
};
use anyhow::Result;
use std::{path::Path, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub ingest: UploadIngest,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire services over an existing catalog.
    pub fn new(config: AppConfig, catalog: Arc<dyn VideoCatalog>) -> Self {
        let storage = StorageService::new(catalog, config.storage_dir.clone());
        let ingest = UploadIngest::new(
            storage.clone(),
            config.allowed_extensions.clone(),
            config.max_file_size,
        );
        Self {
            storage,
            ingest,
            config: Arc::new(config),
        }
    }

    /// Create the storage directory, open the configured catalog and apply
    /// migrations.
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        if !Path::new(&config.storage_dir).exists() {
            tokio::fs::create_dir_all(&config.storage_dir).await?;
            tracing::info!("Created storage directory at {}", config.storage_dir);
        }

        let catalog: Arc<dyn VideoCatalog> = if config.database_url == "memory" {
            tracing::warn!("Using in-memory catalog; records are lost on restart");
            Arc::new(MemoryCatalog::new())
        } else {
            let pool = db::connect(&config.database_url).await?;
            db::run_migrations(&pool).await?;
            Arc::new(SqliteCatalog::new(Arc::new(pool)))
        };

        Ok(Self::new(config, catalog))
    }

    pub fn range_policy(&self) -> MalformedRangePolicy {
        if self.config.strict_ranges {
            MalformedRangePolicy::Reject
        } else {
            MalformedRangePolicy::Ignore
        }
    }

    pub fn stream_url(&self, video_id: &uuid::Uuid) -> String {
        format!("{}/stream/{}", self.config.public_base_url, video_id)
    }
}
