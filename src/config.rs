use crate::services::store::r2::R2Settings;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::env;

/// Which object store adapter serves requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Cloudflare R2 over the S3 API.
    R2,
    /// Local disk + SQLite, for development.
    Local,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub storage_dir: String,
    pub database_url: String,
    pub r2: Option<R2Settings>,
    pub service: ServiceSettings,
}

/// Settings handlers read on every request.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Externally reachable base URL of this API, used to build proxy URLs.
    pub api_base_url: String,
    /// Lifetime of presigned upload URLs, in seconds.
    pub upload_url_expiry_secs: u32,
    /// Largest `fileSize` accepted for presigned uploads, in bytes.
    pub max_upload_size: u64,
    /// Per-file limit for `POST /presigned-multiple`, in bytes.
    pub max_batch_file_size: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3001".into(),
            upload_url_expiry_secs: 3600,
            max_upload_size: 500 * 1024 * 1024,
            max_batch_file_size: 100 * 1024 * 1024,
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Object storage access API for course files")]
pub struct Args {
    /// Host to bind to (overrides STORAGE_API_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides STORAGE_API_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store backend (overrides STORAGE_API_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Directory for the local backend's payloads (overrides STORAGE_API_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides STORAGE_API_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL of this API (overrides STORAGE_API_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

fn env_parsed<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn required_env(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{} must be set for the r2 backend", name))
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env_or("STORAGE_API_HOST", "0.0.0.0");
        let env_port = env_parsed("STORAGE_API_PORT", 3001u16)?;
        let env_backend = match env::var("STORAGE_API_BACKEND") {
            Ok(value) => Backend::from_str(&value, true)
                .map_err(|e| anyhow::anyhow!("parsing STORAGE_API_BACKEND: {}", e))?,
            Err(_) => Backend::R2,
        };
        let env_storage = env_or("STORAGE_API_STORAGE_DIR", "./data/objects");
        let env_db = env_or("STORAGE_API_DATABASE_URL", "sqlite://./data/meta/storage.db");
        let env_public = env_or("STORAGE_API_PUBLIC_URL", "http://localhost:3001");

        let defaults = ServiceSettings::default();
        let service = ServiceSettings {
            api_base_url: args
                .public_url
                .unwrap_or(env_public)
                .trim_end_matches('/')
                .to_string(),
            upload_url_expiry_secs: env_parsed(
                "STORAGE_API_UPLOAD_EXPIRY_SECS",
                defaults.upload_url_expiry_secs,
            )?,
            max_upload_size: env_parsed("STORAGE_API_MAX_UPLOAD_SIZE", defaults.max_upload_size)?,
            max_batch_file_size: env_parsed(
                "STORAGE_API_MAX_BATCH_FILE_SIZE",
                defaults.max_batch_file_size,
            )?,
        };

        // --- Merge ---
        let backend = args.backend.unwrap_or(env_backend);
        let r2 = match backend {
            Backend::R2 => Some(R2Settings {
                account_id: required_env("R2_ACCOUNT_ID")?,
                access_key_id: required_env("R2_ACCESS_KEY_ID")?,
                secret_access_key: required_env("R2_SECRET_ACCESS_KEY")?,
                bucket_name: required_env("R2_BUCKET_NAME")?,
                public_url: required_env("R2_PUBLIC_URL")?,
            }),
            Backend::Local => None,
        };

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backend,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            r2,
            service,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
