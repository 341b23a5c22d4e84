use crate::models::flags::FeatureFlags;
use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use std::env;

/// How much of an internal error is exposed in a 500 response body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ErrorDetail {
    /// The full error chain.
    #[default]
    Verbose,
    /// A generic `internal error`.
    Redacted,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub bucket: String,
    pub flags: FeatureFlags,
    pub error_detail: ErrorDetail,
    pub push_id: Option<String>,
    pub compress: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Public read-only gateway for an object store bucket")]
pub struct Args {
    /// Host to bind to (overrides GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket to serve (overrides GATEWAY_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Comma-separated feature flags: disallowRobots, emulatePages,
    /// listDirectories (overrides GATEWAY_FLAGS)
    #[arg(long)]
    pub flags: Option<String>,

    /// Detail of 500 response bodies (overrides GATEWAY_ERROR_DETAIL)
    #[arg(long, value_enum)]
    pub error_detail: Option<ErrorDetail>,

    /// Deployment identifier logged with every request (overrides GATEWAY_PUSH_ID)
    #[arg(long)]
    pub push_id: Option<String>,

    /// Compress responses that are not already encoded (overrides GATEWAY_COMPRESS)
    #[arg(long)]
    pub compress: bool,

    /// Create the schema and the bucket, then exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("GATEWAY_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing GATEWAY_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading GATEWAY_PORT"),
        };
        let env_storage =
            env::var("GATEWAY_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("GATEWAY_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/object_store.db".into());
        let env_bucket = env::var("GATEWAY_BUCKET").unwrap_or_else(|_| "public".into());
        let env_flags = env::var("GATEWAY_FLAGS").unwrap_or_default();
        let env_error_detail = match env::var("GATEWAY_ERROR_DETAIL") {
            Ok(value) => ErrorDetail::from_str(&value, true)
                .map_err(|err| anyhow!(err))
                .with_context(|| format!("parsing GATEWAY_ERROR_DETAIL value `{}`", value))?,
            Err(env::VarError::NotPresent) => ErrorDetail::default(),
            Err(err) => return Err(err).context("reading GATEWAY_ERROR_DETAIL"),
        };
        let env_push_id = env::var("GATEWAY_PUSH_ID").ok().filter(|id| !id.is_empty());
        let env_compress = match env::var("GATEWAY_COMPRESS") {
            Ok(value) => parse_bool(&value)
                .with_context(|| format!("parsing GATEWAY_COMPRESS value `{}`", value))?,
            Err(env::VarError::NotPresent) => false,
            Err(err) => return Err(err).context("reading GATEWAY_COMPRESS"),
        };

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            bucket: args.bucket.unwrap_or(env_bucket),
            flags: FeatureFlags::parse(&args.flags.unwrap_or(env_flags)),
            error_detail: args.error_detail.unwrap_or(env_error_detail),
            push_id: args.push_id.or(env_push_id),
            compress: args.compress || env_compress,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(anyhow!("expected a boolean, got `{}`", other)),
    }
}
