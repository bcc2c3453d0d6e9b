//! Revocation ledger for PostgreSQL.
//!
//! One row per revoked `jti`. Revocation is a single conditional insert, so
//! concurrent revokes of the same `jti` race on the primary key and exactly
//! one of them inserts a row.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use time::OffsetDateTime;
use tokengate_auth::{LedgerError, RevocationLedger, RevokeOutcome};

use crate::{PgPool, StorageError, StorageResult};

pub(crate) const REVOKE_SQL: &str = r#"
INSERT INTO revoked_tokens (jti, revoked_at)
VALUES ($1, $2)
ON CONFLICT (jti) DO NOTHING
"#;

pub(crate) const IS_REVOKED_SQL: &str = r#"
SELECT EXISTS(
    SELECT 1 FROM revoked_tokens WHERE jti = $1
)
"#;

pub(crate) const PURGE_SQL: &str = r#"
DELETE FROM revoked_tokens
WHERE revoked_at < $1
"#;

pub(crate) const COUNT_SQL: &str = "SELECT COUNT(*) FROM revoked_tokens";

/// Maps the affected row count of [`REVOKE_SQL`] to an outcome.
pub(crate) fn revoke_outcome(rows_affected: u64) -> RevokeOutcome {
    if rows_affected == 1 {
        RevokeOutcome::Revoked
    } else {
        RevokeOutcome::AlreadyRevoked
    }
}

/// PostgreSQL-backed revocation ledger.
#[derive(Debug, Clone)]
pub struct PostgresRevocationLedger {
    pool: Arc<PgPool>,
}

impl PostgresRevocationLedger {
    /// Creates a ledger over `pool`.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn insert(&self, jti: &str, revoked_at: OffsetDateTime) -> StorageResult<RevokeOutcome> {
        if jti.is_empty() {
            return Err(StorageError::invalid_input("jti is empty"));
        }
        let result = query(REVOKE_SQL)
            .bind(jti)
            .bind(revoked_at)
            .execute(self.pool.as_ref())
            .await?;
        Ok(revoke_outcome(result.rows_affected()))
    }

    async fn exists(&self, jti: &str) -> StorageResult<bool> {
        let exists: bool = query_scalar(IS_REVOKED_SQL)
            .bind(jti)
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(exists)
    }

    async fn delete_before(&self, cutoff: OffsetDateTime) -> StorageResult<u64> {
        let result = query(PURGE_SQL)
            .bind(cutoff)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> StorageResult<i64> {
        let count: i64 = query_scalar(COUNT_SQL)
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl RevocationLedger for PostgresRevocationLedger {
    async fn revoke(
        &self,
        jti: &str,
        revoked_at: OffsetDateTime,
    ) -> Result<RevokeOutcome, LedgerError> {
        self.insert(jti, revoked_at).await.map_err(|e| {
            tracing::warn!(jti = %jti, error = %e, "Revocation insert failed");
            LedgerError::from(e)
        })
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, LedgerError> {
        self.exists(jti).await.map_err(|e| {
            tracing::warn!(jti = %jti, error = %e, "Revocation lookup failed");
            LedgerError::from(e)
        })
    }

    async fn purge_revoked_before(&self, cutoff: OffsetDateTime) -> Result<u64, LedgerError> {
        Ok(self.delete_before(cutoff).await?)
    }

    async fn len(&self) -> Result<u64, LedgerError> {
        let count = self.count().await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revoke_outcome_from_rows_affected() {
        assert_eq!(revoke_outcome(1), RevokeOutcome::Revoked);
        assert_eq!(revoke_outcome(0), RevokeOutcome::AlreadyRevoked);
    }

    #[test]
    fn test_revoke_is_single_conditional_insert() {
        assert!(REVOKE_SQL.contains("ON CONFLICT (jti) DO NOTHING"));
        assert!(!REVOKE_SQL.contains("SELECT"));
    }

    #[test]
    fn test_lookup_and_purge_use_indexed_columns() {
        assert!(IS_REVOKED_SQL.contains("WHERE jti = $1"));
        assert!(PURGE_SQL.contains("WHERE revoked_at < $1"));
    }
}
