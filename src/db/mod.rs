mod models;
pub mod query;
pub mod tours;
pub mod users;
pub mod validation;

pub use models::*;

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub type DbPool = SqlitePool;

/// Failures surfaced by the store layer, normalized into HTTP errors at the
/// API boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid input: {}", .0.join(", "))]
    Validation(Vec<String>),
    #[error("duplicate value for {0}")]
    Duplicate(&'static str),
    #[error("invalid {field}: {value}")]
    Cast { field: String, value: String },
    #[error("no record found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Map a sqlx execution error, attributing unique-constraint violations
    /// to the given field.
    pub fn from_sqlx(err: sqlx::Error, unique_field: &'static str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.message().contains("UNIQUE constraint failed") {
                return StoreError::Duplicate(unique_field);
            }
        }
        StoreError::Database(err)
    }
}

/// Current timestamp in the canonical storage format: RFC 3339 with
/// microsecond precision, UTC. Fixed width, so lexicographic order is
/// chronological order.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        // Strip SQL comment lines (lines starting with --)
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

/// Open (or create) the database under the given data directory and bring
/// the schema up to date.
pub async fn init(data_dir: &Path) -> Result<DbPool> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("trailhead.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    info!("Initializing database at {}", db_path.display());
    connect(&db_url).await
}

/// Connect to any SQLite URL and run migrations. Tests use this with
/// `sqlite::memory:`.
pub async fn connect(db_url: &str) -> Result<DbPool> {
    // An in-memory database exists per connection; keep a single one so the
    // schema survives across checkouts.
    let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await?;

    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    execute_sql(pool, include_str!("../../migrations/001_users.sql")).await?;
    execute_sql(pool, include_str!("../../migrations/002_tours.sql")).await?;

    info!("Migrations completed");
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    connect("sqlite::memory:")
        .await
        .expect("in-memory pool should initialize")
}
