//! Guarded ledger access: timeouts, bounded retry and failure policy.
//!
//! Every backend call is bounded by `storage_timeout`. Failed or timed-out
//! calls are retried with doubling backoff up to `max_retry_attempts` total
//! attempts. When retries run out:
//!
//! - [`LedgerGuard::is_revoked`] fails closed with
//!   [`AuthError::StorageUnavailable`]; a token whose revocation status is
//!   unknown is never trusted.
//! - [`LedgerGuard::is_revoked_advisory`] answers `false` instead, but only
//!   with [`LookupFailureMode::FailOpen`]. Use it for display-only lookups.
//!
//! A revoke that timed out may still have committed, in which case its retry
//! reports [`RevokeOutcome::AlreadyRevoked`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{LedgerError, RevocationLedger, RevokeOutcome};
use crate::AuthResult;
use crate::error::AuthError;

/// What an advisory lookup answers when the ledger cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailureMode {
    /// Report the failure.
    #[default]
    FailClosed,
    /// Treat the token as not revoked.
    FailOpen,
}

/// Timeout and retry settings for ledger calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardPolicy {
    /// Upper bound for a single backend call.
    pub storage_timeout: Duration,
    /// Total attempts per operation, including the first.
    pub max_retry_attempts: u32,
    /// Delay before the first retry; doubles on each retry.
    pub retry_backoff: Duration,
    /// Cap for the retry delay.
    pub max_retry_backoff: Duration,
    /// Behaviour of advisory lookups when retries run out.
    pub advisory_lookup_failure: LookupFailureMode,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(2),
            max_retry_attempts: 3,
            retry_backoff: Duration::from_millis(50),
            max_retry_backoff: Duration::from_secs(1),
            advisory_lookup_failure: LookupFailureMode::FailClosed,
        }
    }
}

/// A [`RevocationLedger`] wrapped with timeouts, retry and failure policy.
#[derive(Clone)]
pub struct LedgerGuard {
    ledger: Arc<dyn RevocationLedger>,
    policy: GuardPolicy,
}

impl std::fmt::Debug for LedgerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerGuard")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl LedgerGuard {
    /// Wraps `ledger` with `policy`.
    #[must_use]
    pub fn new(ledger: Arc<dyn RevocationLedger>, policy: GuardPolicy) -> Self {
        Self { ledger, policy }
    }

    /// The wrapped backend.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn RevocationLedger> {
        &self.ledger
    }

    /// The policy in effect.
    #[must_use]
    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    /// Records a revocation.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageUnavailable`] once retries are exhausted.
    pub async fn revoke(&self, jti: &str, now: OffsetDateTime) -> AuthResult<RevokeOutcome> {
        let outcome = self
            .with_retry("revoke", || self.ledger.revoke(jti, now))
            .await
            .map_err(|e| {
                tracing::error!(jti = %jti, error = %e, "Revocation could not be recorded");
                AuthError::from(e)
            })?;

        match outcome {
            RevokeOutcome::Revoked => tracing::info!(jti = %jti, "Token revoked"),
            RevokeOutcome::AlreadyRevoked => tracing::debug!(jti = %jti, "Token already revoked"),
        }
        Ok(outcome)
    }

    /// Security-critical revocation lookup. Always fails closed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageUnavailable`] once retries are exhausted.
    pub async fn is_revoked(&self, jti: &str) -> AuthResult<bool> {
        self.with_retry("is_revoked", || self.ledger.is_revoked(jti))
            .await
            .map_err(|e| {
                tracing::error!(jti = %jti, error = %e, "Revocation status unknown, rejecting");
                AuthError::from(e)
            })
    }

    /// Non-critical revocation lookup.
    ///
    /// # Errors
    ///
    /// With [`LookupFailureMode::FailClosed`], returns
    /// [`AuthError::StorageUnavailable`] once retries are exhausted.
    pub async fn is_revoked_advisory(&self, jti: &str) -> AuthResult<bool> {
        match self.with_retry("is_revoked", || self.ledger.is_revoked(jti)).await {
            Ok(revoked) => Ok(revoked),
            Err(e) if self.policy.advisory_lookup_failure == LookupFailureMode::FailOpen => {
                tracing::warn!(jti = %jti, error = %e, "Revocation status unknown, assuming not revoked");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes entries revoked before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageUnavailable`] once retries are exhausted.
    pub async fn purge_revoked_before(&self, cutoff: OffsetDateTime) -> AuthResult<u64> {
        self.with_retry("purge", || self.ledger.purge_revoked_before(cutoff))
            .await
            .map_err(AuthError::from)
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let max_attempts = self.policy.max_retry_attempts.max(1);
        let mut attempts = 0;
        let mut backoff = self.policy.retry_backoff;

        loop {
            let result = match tokio::time::timeout(self.policy.storage_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(LedgerError::Timeout {
                    after_ms: self.policy.storage_timeout.as_millis(),
                }),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Err(e);
                    }

                    tracing::warn!(
                        operation,
                        attempt = attempts,
                        max_attempts,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Revocation storage call failed, retrying"
                    );

                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff, self.policy.max_retry_backoff);
                }
            }
        }
    }
}

/// Doubles `current`, capped at `max`.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
