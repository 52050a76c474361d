//! SQLite connection pool setup.

use crate::error::{DatabaseError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

const IN_MEMORY: &str = ":memory:";

/// Connection pool over a single `SQLite` database file.
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: Pool<Sqlite>,
}

impl DbPool {
    /// Open (creating if missing) the database at `path`.
    ///
    /// `:memory:` opens a private in-memory database backed by one
    /// long-lived connection, so it survives for the life of the pool.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_str().ok_or_else(|| {
            DatabaseError::Open("invalid database path: not valid UTF-8".to_string())
        })?;

        let in_memory = path_str == IN_MEMORY;
        let mut connect_options = SqliteConnectOptions::from_str(path_str)
            .map_err(|e| DatabaseError::Open(format!("invalid connection string: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DatabaseError::Open(format!("failed to open {path_str}: {e}")))?;

        tracing::info!("Database pool created at {}", path_str);

        Ok(Self { pool })
    }

    /// Get a reference to the underlying `SQLx` pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the connection pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_pool() {
        let pool = DbPool::open(":memory:").await.expect("open in-memory pool");
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(pool.pool())
            .await
            .expect("select");
        assert_eq!(one, 1);
    }

    #[tokio::test]
    async fn test_file_pool_created_if_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audits.db");

        let pool = DbPool::open(&path).await.expect("open file pool");
        assert!(path.exists());

        pool.close().await;
        assert!(pool.pool().is_closed());
    }
}
