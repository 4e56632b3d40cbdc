use anyhow::Result;
use axum::Router;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    config::Backend,
    services::{
        AppState,
        store::{LocalStore, ObjectStore, R2Store},
    },
};

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

const INIT_MIGRATION: &str = include_str!("../migrations/0001_init.sql");

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting storage-api with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    // --- Handle migration mode ---
    if migrate {
        run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }
    // statements are idempotent, so a fresh database works without --migrate
    run_migrations(&db).await?;

    // --- Initialize object store ---
    let (store, local): (Arc<dyn ObjectStore>, Option<LocalStore>) = match cfg.backend {
        Backend::R2 => {
            let settings = cfg
                .r2
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("r2 backend selected without R2 settings"))?;
            let r2 = R2Store::from_settings(settings)?;
            tracing::info!(bucket = %settings.bucket_name, "using R2 object store");
            (Arc::new(r2), None)
        }
        Backend::Local => {
            if !Path::new(&cfg.storage_dir).exists() {
                fs::create_dir_all(&cfg.storage_dir)?;
                tracing::info!("Created storage directory at {}", cfg.storage_dir);
            }
            let local = LocalStore::new(
                db.clone(),
                cfg.storage_dir.clone(),
                cfg.service.api_base_url.clone(),
            );
            tracing::info!(dir = %cfg.storage_dir, "using local object store");
            (Arc::new(local.clone()), Some(local))
        }
    };

    tracing::warn!(
        "signed-url responses are proxy URLs; expiresAt is advisory and not enforced by access routes"
    );

    // --- Build router ---
    let state = AppState::new(store, db, cfg.service.clone());
    let app: Router = routes::routes::routes(local).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run the embedded SQLite migration, statement by statement.
pub async fn run_migrations(db: &SqlitePool) -> Result<()> {
    let statements = INIT_MIGRATION
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}
