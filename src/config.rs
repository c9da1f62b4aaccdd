use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024 * 1024;
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 7] =
    [".mp4", ".avi", ".mov", ".mkv", ".webm", ".flv", ".wmv"];
pub const DEFAULT_API_KEY: &str = "change-me";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub api_key: String,
    pub max_file_size: u64,
    /// Lowercased, dot-prefixed suffixes (e.g. `.mp4`).
    pub allowed_extensions: Vec<String>,
    pub public_base_url: String,
    /// Answer malformed `Range` headers with 400 instead of serving the whole file.
    pub strict_ranges: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Video upload and byte-range streaming service")]
pub struct Args {
    /// Host to bind to (overrides VIDEO_SERVICE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VIDEO_SERVICE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded videos are stored (overrides VIDEO_SERVICE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Catalog database URL, or `memory` (overrides VIDEO_SERVICE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// API key required by management endpoints (overrides VIDEO_SERVICE_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Maximum upload size in bytes (overrides VIDEO_SERVICE_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Comma separated extension allow-list (overrides VIDEO_SERVICE_ALLOWED_EXTENSIONS)
    #[arg(long)]
    pub allowed_extensions: Option<String>,

    /// Base URL used to build `stream_url` (overrides VIDEO_SERVICE_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Reject malformed Range headers with 400 (overrides VIDEO_SERVICE_STRICT_RANGES)
    #[arg(long)]
    pub strict_ranges: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge already-parsed CLI args over the environment and defaults.
    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("VIDEO_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("VIDEO_SERVICE_PORT")?.unwrap_or(8001);
        let env_storage =
            env::var("VIDEO_SERVICE_STORAGE_DIR").unwrap_or_else(|_| "./uploaded_videos".into());
        let env_db = env::var("VIDEO_SERVICE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/videos.db".into());
        let env_key = env::var("VIDEO_SERVICE_API_KEY").unwrap_or_else(|_| DEFAULT_API_KEY.into());
        let env_max = env_parse("VIDEO_SERVICE_MAX_FILE_SIZE")?.unwrap_or(DEFAULT_MAX_FILE_SIZE);
        let env_exts = env::var("VIDEO_SERVICE_ALLOWED_EXTENSIONS").ok();
        let env_base = env::var("VIDEO_SERVICE_PUBLIC_BASE_URL").ok();
        let env_strict = env_parse::<bool>("VIDEO_SERVICE_STRICT_RANGES")?.unwrap_or(false);

        // --- Merge ---
        let port = args.port.unwrap_or(env_port);
        let allowed_extensions = match args.allowed_extensions.or(env_exts) {
            Some(list) => parse_extensions(&list),
            None => DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        };
        let public_base_url = args
            .public_base_url
            .or(env_base)
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            api_key: args.api_key.unwrap_or(env_key),
            max_file_size: args.max_file_size.unwrap_or(env_max),
            allowed_extensions,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            strict_ranges: args.strict_ranges || env_strict,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an optional environment variable.
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

/// Normalize a comma separated list like `mp4, .MKV` into `[".mp4", ".mkv"]`.
pub fn parse_extensions(list: &str) -> Vec<String> {
    list.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext))
        .collect()
}
