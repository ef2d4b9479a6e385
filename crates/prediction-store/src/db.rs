use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::StoreResult;

/// Handle to the single trading database.
#[derive(Clone)]
pub struct TradingDb {
    pool: SqlitePool,
}

impl TradingDb {
    /// Open (creating if missing) and apply the schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        // Each connection to :memory: is its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;

        tracing::debug!("Opened trading database {}", database_url);
        Ok(db)
    }

    /// Open an existing database without writing to it: no schema, no WAL
    /// switch, no file creation.
    pub async fn open_read_only(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(file_path(database_url))
            .read_only(true);

        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;

        tracing::debug!("Opened {} read-only", database_url);
        Ok(Self { pool })
    }

    /// Idempotent: every statement is `IF NOT EXISTS`.
    async fn init_schema(&self) -> StoreResult<()> {
        let schema = include_str!("../schema.sql");

        // sqlx runs one statement per query
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if database file exists
    pub fn exists(path: &str) -> bool {
        Path::new(file_path(path)).exists()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Strip the `sqlite:` / `sqlite://` prefix and any query string.
pub fn file_path(url: &str) -> &str {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    path.split('?').next().unwrap_or(path)
}
