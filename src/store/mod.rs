//! Relational persistence on SQLite
//!
//! `Store` owns the connection pool. Multi-row writes go through
//! `Store::begin()` and the query functions in the submodules, which all
//! take a `&mut SqliteConnection` so they run equally on a pooled
//! connection or inside a transaction.

pub mod alerts;
pub mod directory;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Handle to the alert database
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database described by `config`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.acquire_timeout_secs));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await?;

        tracing::info!(
            url = %config.url,
            max_connections = config.max_connections,
            "Connected to database"
        );
        Ok(Self { pool })
    }

    /// Private in-memory database with the schema applied
    ///
    /// Uses a single long-lived connection, since every SQLite memory
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::debug!("Database migrations applied");
        Ok(())
    }

    /// Start a write transaction; dropping it without commit rolls back
    ///
    /// Opens with `BEGIN IMMEDIATE`: the write lock is taken at `BEGIN`, so
    /// concurrent writers wait out the busy timeout instead of failing with
    /// `SQLITE_BUSY` on their first write.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Round-trip check used by the health endpoint
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
