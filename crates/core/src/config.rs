use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SalesError;
use crate::schedule::{parse_cron, Trigger};
use crate::schema::SaleSchema;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub postgres: PostgresConfig,
    pub ingest: IngestConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `SALESDASH_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("SALESDASH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let storage = StorageConfig::from_env_profiled(p);
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            ingest: IngestConfig::from_env_profiled(p, &storage),
            storage,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject settings that would only fail later, mid-cycle.
    pub fn validate(&self) -> Result<(), SalesError> {
        self.ingest.validate()
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        tracing::info!("  storage:     data_dir={}", self.storage.data_dir.display());
        tracing::info!(
            "  postgres:    host={}, db={}, configured={}",
            self.postgres.host,
            self.postgres.database,
            self.postgres.is_configured()
        );
        tracing::info!(
            "  ingest:      dir={}, schema={}, table={}, trigger={}",
            self.ingest.watch_dir.display(),
            self.ingest.schema,
            self.ingest.table,
            self.ingest
                .trigger()
                .map(|t| t.to_string())
                .unwrap_or_else(|e| e.to_string())
        );
        tracing::info!(
            "  ingest:      chunk_size={}, ledger={}, max_failures={}, quarantine={}",
            self.ingest.chunk_size,
            self.ingest.ledger_enabled,
            self.ingest.max_failures,
            self.ingest.quarantine_dir.display()
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 3001),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for the cycle log, the ledger and the default quarantine dir.
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
        }
    }

    pub fn ingestion_dir(&self) -> PathBuf {
        self.data_dir.join("ingestion")
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Full connection URL; takes precedence over the individual fields.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "PG_URL"),
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "salesdash"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some() || self.username.is_some()
    }
}

// ── Ingestion ─────────────────────────────────────────────────

/// Largest sub-batch that stays under PostgreSQL's 65535 bind parameters
/// with seven columns per row.
pub const MAX_CHUNK_SIZE: usize = 9000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory polled for `.csv` files.
    pub watch_dir: PathBuf,
    /// Seconds between cycles when no cron expression is set.
    pub interval_secs: u64,
    /// Cron expression (5 or 6 fields); overrides `interval_secs`.
    pub cron: Option<String>,
    pub schema: SaleSchema,
    /// Target table; must be a plain SQL identifier.
    pub table: String,
    /// Rows per INSERT statement inside the batch transaction.
    pub chunk_size: usize,
    /// Consecutive failed cycles before a file is quarantined (0 = never).
    pub max_failures: u32,
    pub quarantine_dir: PathBuf,
    /// Skip files whose content was already committed.
    pub ledger_enabled: bool,
    /// `INGEST_SCHEMA` value that named no known schema.
    #[serde(skip)]
    rejected_schema: Option<String>,
}

impl IngestConfig {
    fn from_env_profiled(p: &str, storage: &StorageConfig) -> Self {
        let raw_schema = profiled_env_opt(p, "INGEST_SCHEMA");
        let parsed_schema = raw_schema.as_deref().map(str::parse::<SaleSchema>);
        let rejected_schema = match &parsed_schema {
            Some(Err(_)) => raw_schema.clone(),
            _ => None,
        };
        let schema = parsed_schema.and_then(Result::ok).unwrap_or_default();
        let default_quarantine = storage.data_dir.join("quarantine");
        Self {
            watch_dir: PathBuf::from(profiled_env_or(p, "INGEST_WATCH_DIR", "uploads")),
            interval_secs: profiled_env_u64(p, "INGEST_INTERVAL_SECS", 300),
            cron: profiled_env_opt(p, "INGEST_CRON"),
            schema,
            table: profiled_env_or(p, "INGEST_TABLE", "sales"),
            chunk_size: (profiled_env_u32(p, "INGEST_CHUNK_SIZE", 1000) as usize)
                .clamp(1, MAX_CHUNK_SIZE),
            max_failures: profiled_env_u32(p, "INGEST_MAX_FAILURES", 3),
            quarantine_dir: profiled_env_opt(p, "INGEST_QUARANTINE_DIR")
                .map(PathBuf::from)
                .unwrap_or(default_quarantine),
            ledger_enabled: profiled_env_bool(p, "INGEST_LEDGER", true),
            rejected_schema,
        }
    }

    /// Defaults rooted at `watch_dir`, for tests and one-off runs.
    pub fn for_dir(watch_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            watch_dir: watch_dir.into(),
            interval_secs: 300,
            cron: None,
            schema: SaleSchema::Sales,
            table: "sales".to_string(),
            chunk_size: 1000,
            max_failures: 3,
            quarantine_dir: data_dir.join("quarantine"),
            ledger_enabled: true,
            rejected_schema: None,
        }
    }

    pub fn trigger(&self) -> Result<Trigger, SalesError> {
        match &self.cron {
            Some(expr) => Ok(Trigger::Cron(Box::new(parse_cron(expr)?))),
            None => Ok(Trigger::Interval(Duration::from_secs(self.interval_secs.max(1)))),
        }
    }

    pub fn validate(&self) -> Result<(), SalesError> {
        if let Some(name) = &self.rejected_schema {
            return Err(SalesError::UnknownSchema(name.clone()));
        }
        if !is_plain_identifier(&self.table) {
            return Err(SalesError::Config(format!(
                "INGEST_TABLE '{}' must match [A-Za-z_][A-Za-z0-9_]*",
                self.table
            )));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(SalesError::Config(format!(
                "INGEST_CHUNK_SIZE must be within 1..={}",
                MAX_CHUNK_SIZE
            )));
        }
        self.trigger().map(|_| ())
    }
}

/// The table name is interpolated into SQL, so only bare identifiers pass.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
