//! Revocation ledger.
//!
//! The ledger records the `jti` of every explicitly revoked token. It is the
//! only shared mutable state in the token lifecycle and is consulted on every
//! authenticated request, so implementations must provide:
//!
//! - atomic insert-if-absent for [`RevocationLedger::revoke`] (a unique
//!   constraint or equivalent, never read-then-write)
//! - O(1) or indexed lookups for [`RevocationLedger::is_revoked`]
//!
//! A lookup running concurrently with a revoke of the same `jti` may observe
//! either state; the window is bounded by the backend's commit latency.
//!
//! Backends are wrapped in a [`LedgerGuard`], which adds per-call timeouts,
//! bounded retry and the fail-closed policy. [`RevocationSweeper`] optionally
//! prunes entries older than the longest possible token lifetime.
//!
//! # Implementations
//!
//! - [`InMemoryRevocationLedger`] - process-local, for tests and single nodes
//! - `tokengate-auth-postgres` - PostgreSQL backend

pub mod guard;
pub mod memory;
pub mod sweeper;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::AuthError;

pub use guard::{GuardPolicy, LedgerGuard, LookupFailureMode};
pub use memory::InMemoryRevocationLedger;
pub use sweeper::RevocationSweeper;

/// A revoked token identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationEntry {
    /// Revoked `jti`.
    pub jti: String,
    /// When the revocation was recorded.
    pub revoked_at: OffsetDateTime,
}

/// Result of a revoke call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// This call created the entry.
    Revoked,
    /// An entry already existed; nothing changed.
    AlreadyRevoked,
}

impl RevokeOutcome {
    /// Returns `true` if this call created the entry.
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Revoked)
    }
}

/// Ledger backend failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The backend could not be reached or returned an error.
    #[error("revocation storage unavailable: {message}")]
    Unavailable {
        /// Backend error description.
        message: String,
    },

    /// The call did not finish within the configured timeout.
    #[error("revocation storage timed out after {after_ms}ms")]
    Timeout {
        /// Timeout that elapsed, in milliseconds.
        after_ms: u128,
    },
}

impl LedgerError {
    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

impl From<LedgerError> for AuthError {
    fn from(e: LedgerError) -> Self {
        AuthError::storage_unavailable(e.to_string())
    }
}

/// Storage backend for revoked token identifiers.
#[async_trait]
pub trait RevocationLedger: Send + Sync {
    /// Records `jti` as revoked at `revoked_at` unless already present.
    ///
    /// Concurrent calls for the same `jti` must produce exactly one
    /// [`RevokeOutcome::Revoked`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the backend fails.
    async fn revoke(&self, jti: &str, revoked_at: OffsetDateTime)
    -> Result<RevokeOutcome, LedgerError>;

    /// Returns `true` if `jti` has been revoked.
    ///
    /// Called on every authenticated request.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the backend fails.
    async fn is_revoked(&self, jti: &str) -> Result<bool, LedgerError>;

    /// Deletes entries revoked strictly before `cutoff`.
    ///
    /// Only safe for entries whose tokens can no longer be valid.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the backend fails.
    async fn purge_revoked_before(&self, cutoff: OffsetDateTime) -> Result<u64, LedgerError>;

    /// Number of entries.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the backend fails.
    async fn len(&self) -> Result<u64, LedgerError>;

    /// Returns `true` if the ledger holds no entries.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the backend fails.
    async fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_error_maps_to_storage_unavailable() {
        let err: AuthError = LedgerError::unavailable("connection refused").into();
        assert!(matches!(err, AuthError::StorageUnavailable { .. }));
        assert!(err.is_retryable());

        let err: AuthError = LedgerError::Timeout { after_ms: 2000 }.into();
        assert!(err.to_string().contains("2000ms"));
    }

    #[test]
    fn test_revoke_outcome() {
        assert!(RevokeOutcome::Revoked.is_new());
        assert!(!RevokeOutcome::AlreadyRevoked.is_new());
    }
}
