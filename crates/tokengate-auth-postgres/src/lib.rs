//! PostgreSQL storage backend for tokengate
//!
//! Provides a persistent [`RevocationLedger`](tokengate_auth::RevocationLedger)
//! backed by a single table:
//!
//! ```sql
//! CREATE TABLE revoked_tokens (
//!     jti        TEXT PRIMARY KEY,
//!     revoked_at TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! The primary key provides both the atomic insert-if-absent that revocation
//! needs and the indexed lookup that authentication needs.
//!
//! # Example
//!
//! ```ignore
//! use tokengate_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/tokengate").await?;
//! storage.ensure_schema().await?;
//! let ledger = Arc::new(storage.revocation_ledger());
//! ```

pub mod revocation;

use std::sync::Arc;
use std::time::Duration;

use sqlx_core::pool::Pool;
use sqlx_core::query::query;
use sqlx_postgres::Postgres;
use tokengate_auth::LedgerError;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use revocation::PostgresRevocationLedger;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Returns `true` if this is an invalid input error.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

impl From<StorageError> for LedgerError {
    fn from(e: StorageError) -> Self {
        LedgerError::unavailable(e.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Schema
// =============================================================================

pub(crate) const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS revoked_tokens (
    jti        TEXT PRIMARY KEY,
    revoked_at TIMESTAMPTZ NOT NULL
)
"#;

pub(crate) const CREATE_INDEX_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS revoked_tokens_revoked_at_idx
    ON revoked_tokens (revoked_at)
"#;

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// Connection pool wrapper for tokengate tables.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Creates storage over an existing pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Connects to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        use sqlx_core::pool::PoolOptions;
        if database_url.trim().is_empty() {
            return Err(StorageError::invalid_input("database URL is empty"));
        }
        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Builds a pool for `database_url` without connecting.
    ///
    /// Connections are opened on first use, each acquire bounded by
    /// `acquire_timeout`, so an unreachable database surfaces as a failed
    /// query rather than a failed constructor.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty or cannot be parsed.
    pub fn connect_lazy(database_url: &str, acquire_timeout: Duration) -> StorageResult<Self> {
        use sqlx_core::pool::PoolOptions;
        if database_url.trim().is_empty() {
            return Err(StorageError::invalid_input("database URL is empty"));
        }
        let pool = PoolOptions::<Postgres>::new()
            .acquire_timeout(acquire_timeout)
            .connect_lazy(database_url)?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Returns a clone of the pool handle.
    #[must_use]
    pub fn pool_arc(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    /// Creates the revocation table and its sweep index if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        query(CREATE_TABLE_SQL).execute(self.pool()).await?;
        query(CREATE_INDEX_SQL).execute(self.pool()).await?;
        tracing::info!("Revocation ledger schema ready");
        Ok(())
    }

    /// Revocation ledger sharing this pool.
    #[must_use]
    pub fn revocation_ledger(&self) -> PostgresRevocationLedger {
        PostgresRevocationLedger::new(self.pool_arc())
    }
}

// =============================================================================
// Tests
// =============================================================================
