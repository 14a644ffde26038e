//! Database connection and pool management.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
/// Default pool size; roughly one connection per concurrent fetch worker.
const MAX_CONNECTIONS: u32 = 8;

/// Connection pool for the module database.
///
/// Cloning is cheap: clones share the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Query-based PRAGMAs are per connection, so they must be applied
            // to every connection the pool opens, not just the first.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Connect to the database file at `path`, creating it if missing, and
    /// run migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with_limit(path, MAX_CONNECTIONS).await
    }

    /// Like [`connect`](Self::connect), with an explicit pool size.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn connect_with_limit(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let options = Self::base_options().filename(path.as_ref()).create_if_missing(true);
        Self::new(options, max_connections.max(1)).await
    }

    /// Connect to an in-memory database.
    ///
    /// Not gated behind `#[cfg(test)]` so that other crates can use it in
    /// their own tests.
    pub async fn connect_in_memory() -> Result<Self> {
        // Every connection to ":memory:" is its own database, so the pool must
        // be limited to a single connection.
        let options = Self::base_options().filename(":memory:");
        Self::new(options, 1).await
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // Concurrent fetch workers all write their version state at the
            // end of every fetch; WAL still only allows one writer at a time.
            .busy_timeout(std::time::Duration::from_secs(5))
            .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::None)
    }

    /// PRAGMAs that aren't exposed via `SqliteConnectOptions`.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA wal_autocheckpoint = 1000;
                PRAGMA cache_size = -16384;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    #[instrument("performing database migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_connect_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modfetch.db");
        let db = Database::connect(&path).await.unwrap();
        assert!(path.is_file());
        let row: (String,) = sqlx::query_as("PRAGMA journal_mode").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, "wal");
        db.close().await;
        // Reconnecting runs the already-applied migrations again.
        Database::connect(&path).await.unwrap().close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        let expected =
            ["alternative_module_paths", "licenses", "modules", "packages", "search_documents", "version_states"];
        for expected in expected {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
        db.close().await;
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1, "foreign_keys should be ON");
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1000);
        db.close().await;
    }
}
