//! Background pruning of stale revocation entries.
//!
//! An entry can be dropped once every token it could apply to has expired on
//! its own. Tokens live at most `token_ttl` (plus validation leeway), so
//! entries revoked before `now - retention` are dead weight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use super::guard::LedgerGuard;
use crate::AuthResult;
use crate::clock::Clock;

/// Periodically purges revocation entries older than the retention window.
pub struct RevocationSweeper {
    guard: LedgerGuard,
    clock: Arc<dyn Clock>,
    retention: time::Duration,
    interval: std::time::Duration,
    shutdown: AtomicBool,
    wake: Notify,
}

impl RevocationSweeper {
    /// Creates a sweeper.
    ///
    /// `retention` should be at least the token lifetime plus leeway.
    #[must_use]
    pub fn new(
        guard: LedgerGuard,
        clock: Arc<dyn Clock>,
        retention: time::Duration,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            guard,
            clock,
            retention,
            interval,
            shutdown: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    /// Runs a single purge and returns the number of removed entries.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AuthError::StorageUnavailable`] if the ledger fails.
    pub async fn sweep_once(&self) -> AuthResult<u64> {
        let cutoff = self.clock.now() - self.retention;
        let removed = self.guard.purge_revoked_before(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, cutoff = %cutoff, "Purged stale revocation entries");
        } else {
            tracing::debug!(cutoff = %cutoff, "No stale revocation entries");
        }
        Ok(removed)
    }

    /// Sweeps every `interval` until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            retention_secs = self.retention.whole_seconds(),
            "Revocation sweeper started"
        );

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::info!("Revocation sweeper shutting down");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Revocation sweep failed");
                    }
                }
                _ = self.wake.notified() => {}
            }
        }
    }

    /// Signals [`run`](Self::run) to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.wake.notify_one();
    }

    /// Returns `true` once shutdown was requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::revocation::{GuardPolicy, InMemoryRevocationLedger, RevocationLedger};
    use time::macros::datetime;

    #[tokio::test]
    async fn test_sweep_once_respects_retention() {
        let ledger = Arc::new(InMemoryRevocationLedger::new());
        let t0 = datetime!(2024-01-01 00:00 UTC);
        ledger.revoke("old", t0).await.unwrap();
        ledger
            .revoke("recent", t0 + time::Duration::hours(20))
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::at(t0 + time::Duration::hours(25)));
        let sweeper = RevocationSweeper::new(
            LedgerGuard::new(ledger.clone(), GuardPolicy::default()),
            clock,
            time::Duration::days(1),
            std::time::Duration::from_secs(600),
        );

        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
        assert!(!ledger.is_revoked("old").await.unwrap());
        assert!(ledger.is_revoked("recent").await.unwrap());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let sweeper = Arc::new(RevocationSweeper::new(
            LedgerGuard::new(Arc::new(InMemoryRevocationLedger::new()), GuardPolicy::default()),
            Arc::new(ManualClock::at(datetime!(2024-01-01 00:00 UTC))),
            time::Duration::days(1),
            std::time::Duration::from_secs(3600),
        ));

        let handle = tokio::spawn({
            let sweeper = sweeper.clone();
            async move { sweeper.run().await }
        });

        sweeper.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(sweeper.is_shutting_down());
    }
}
