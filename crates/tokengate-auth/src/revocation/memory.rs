//! In-memory revocation ledger.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use super::{LedgerError, RevocationEntry, RevocationLedger, RevokeOutcome};

/// Process-local ledger backed by a sharded concurrent map.
///
/// Entries are lost on restart. Suitable for tests and single-node
/// deployments that accept that.
#[derive(Debug, Default)]
pub struct InMemoryRevocationLedger {
    entries: DashMap<String, OffsetDateTime>,
}

impl InMemoryRevocationLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `jti`, if revoked.
    #[must_use]
    pub fn get(&self, jti: &str) -> Option<RevocationEntry> {
        self.entries.get(jti).map(|e| RevocationEntry {
            jti: e.key().clone(),
            revoked_at: *e.value(),
        })
    }

    /// Snapshot of all entries, in no particular order.
    #[must_use]
    pub fn entries(&self) -> Vec<RevocationEntry> {
        self.entries
            .iter()
            .map(|e| RevocationEntry {
                jti: e.key().clone(),
                revoked_at: *e.value(),
            })
            .collect()
    }
}

#[async_trait]
impl RevocationLedger for InMemoryRevocationLedger {
    async fn revoke(
        &self,
        jti: &str,
        revoked_at: OffsetDateTime,
    ) -> Result<RevokeOutcome, LedgerError> {
        // The shard lock is held for the whole entry call.
        match self.entries.entry(jti.to_string()) {
            Entry::Occupied(_) => Ok(RevokeOutcome::AlreadyRevoked),
            Entry::Vacant(slot) => {
                slot.insert(revoked_at);
                Ok(RevokeOutcome::Revoked)
            }
        }
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, LedgerError> {
        Ok(self.entries.contains_key(jti))
    }

    async fn purge_revoked_before(&self, cutoff: OffsetDateTime) -> Result<u64, LedgerError> {
        let mut removed = 0u64;
        self.entries.retain(|_, revoked_at| {
            let keep = *revoked_at >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn len(&self) -> Result<u64, LedgerError> {
        Ok(self.entries.len() as u64)
    }
}
