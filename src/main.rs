use anyhow::{Context, Result};
use axum::Router;
use handlers::gateway_handlers::GatewayState;
use services::storage_service::{self, StorageService};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

/// Region recorded for buckets created by `--migrate`.
const LOCAL_REGION: &str = "local";

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting bucket-gateway with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    let connect_options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database URL {}", db_url))?
        .create_if_missing(true);

    // Create parent directory if needed
    if let Some(parent) = connect_options.get_filename().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("connecting to {}", db_url))?,
    );

    // --- Handle migration mode ---
    if migrate {
        let statements = storage_service::apply_schema(&db).await?;
        tracing::info!("Ran {} migration statements", statements);
        storage_service::ensure_bucket(&db, &cfg.bucket, LOCAL_REGION).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core service ---
    let storage = StorageService::open(db.clone(), cfg.storage_dir.clone(), &cfg.bucket)
        .await
        .with_context(|| format!("opening bucket {} (run with --migrate first?)", cfg.bucket))?;

    let state = GatewayState {
        store: Arc::new(storage),
        flags: cfg.flags,
        error_detail: cfg.error_detail,
        push_id: cfg.push_id.clone(),
    };
    tracing::info!("Feature flags: {:?}", state.flags);

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.compress).with_state(state);

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
