//! Vantage Database Layer
//!
//! Stores finished audits: one `SQLite` row per audit in `audits`, plus the
//! audit's screenshots in an object store addressed by public URL.
//!
//! # Architecture
//!
//! - **Migrations**: SQL migrations are embedded and versioned using `SQLx`
//! - **Objects**: [`ObjectStore`] trait, [`FsObjectStore`] writes to a served directory
//! - **Finalize**: [`AuditStore::finalize`] is all-or-nothing
//!
//! # Example
//!
//! ```ignore
//! use vantage_db::{AuditStore, FinalizeRequest, SqliteAuditStore};
//!
//! let store = SqliteAuditStore::from_config(&config.storage).await?;
//! let finalized = store.finalize(FinalizeRequest { url, report, screenshots }).await?;
//! let record = store.fetch(finalized.audit_id.as_str()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod audits;
pub mod connection;
pub mod error;
pub mod migrations;
pub mod objects;
pub mod store;

// Re-export commonly used types
pub use audits::AuditRecord;
pub use connection::DbPool;
pub use error::{DatabaseError, Result};
pub use objects::{FsObjectStore, ObjectStore};
pub use store::{AuditStore, FinalizeRequest, FinalizedAudit, SqliteAuditStore};

use std::path::Path;

/// Database handle that knows how to migrate itself.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open the database at `path` (or `:memory:`).
    ///
    /// # Errors
    /// Returns `DatabaseError::Open` if the database cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let pool = DbPool::open(path).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Run all pending database migrations.
    ///
    /// # Errors
    /// Returns `DatabaseError::Migration` if any migration fails.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(self.pool.pool()).await
    }

    /// Latest applied migration version.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the version cannot be queried.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(self.pool.pool()).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        self.pool.pool()
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
