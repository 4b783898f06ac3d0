//! SQLite-backed storage.
//!
//! The delivery path is write-heavy (every delivered frame inserts a
//! message row and presence flips rewrite the user row) while the REST
//! surface mostly reads, so connections run in WAL mode: readers stay off
//! the writer's lock and short write bursts wait on the busy timeout
//! instead of failing. Chat deletion relies on cascading foreign keys, so
//! enforcement is pinned on explicitly.

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;

/// Serves the fan-out tasks' membership and presence lookups running
/// concurrently with REST reads; one instance never needs more.
const POOL_SIZE: u32 = 8;

/// How long a statement waits on the single WAL writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory: {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        Self::open(options, POOL_SIZE).await
    }

    /// Create an in-memory database (for testing). An in-memory database
    /// lives inside its connection, so the pool is pinned to a single one
    /// that every caller shares.
    pub async fn in_memory() -> Result<Self> {
        Self::open(SqliteConnectOptions::new().in_memory(true), 1).await
    }

    async fn open(options: SqliteConnectOptions, connections: u32) -> Result<Self> {
        let options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(connections)
            .connect_with(options)
            .await
            .context("opening database pool")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("running database migrations")?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
