//! Database pool configuration and migrations

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::TallyConfig;
use crate::error::Result;

/// Open the pool described by `config` and bring the schema up to date.
pub async fn connect(config: &TallyConfig) -> Result<SqlitePool> {
    let pool = create_pool(
        &config.database_url,
        config.max_connections,
        Duration::from_secs(config.busy_timeout_secs),
    )
    .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Create a WAL-mode SQLite pool; writers wait up to `busy_timeout` for the lock.
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    busy_timeout: Duration,
) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    info!("Connected to {database_url} ({max_connections} connections)");
    Ok(pool)
}

/// In-memory database on a single long-lived connection, already migrated.
///
/// Every connection to `sqlite::memory:` gets its own database, so the pool
/// must never open a second one or recycle the first.
pub async fn memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply embedded migrations. Safe to call at every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Get current schema version (number of applied migrations)
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i64> {
    let result: Option<(i64,)> =
        sqlx::query_as("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_optional(pool)
            .await?;

    Ok(result.map(|(c,)| c).unwrap_or(0))
}
