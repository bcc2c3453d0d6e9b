#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use tokengate_auth::{
    AuthFailure, Authenticator, GuardPolicy, Identity, IdentityProvider, InMemoryRevocationLedger,
    KeyRing, KeyStore, LedgerError, LedgerGuard, LookupFailureMode, ManualClock,
    RevocationLedger, RevokeOutcome, SigningAlgorithm, SigningKey, TokenSigner, TokenValidator,
    ValidationOptions,
};

pub const ISSUER: &str = "https://localhost:44327/";
pub const AUDIENCE: &str = "https://localhost:44327/";

pub fn t0() -> OffsetDateTime {
    datetime!(2024-06-01 08:00 UTC)
}

pub fn admin() -> Identity {
    Identity::new("user-1", "a@x.com", ["Admin"]).with_display_name("Ada")
}

pub fn hmac_key(kid: &str, byte: u8) -> SigningKey {
    SigningKey::hmac(kid, SigningAlgorithm::HS256, &[byte; 48]).expect("valid key")
}

pub fn fast_policy() -> GuardPolicy {
    GuardPolicy {
        storage_timeout: StdDuration::from_millis(50),
        max_retry_attempts: 3,
        retry_backoff: StdDuration::from_millis(1),
        max_retry_backoff: StdDuration::from_millis(5),
        advisory_lookup_failure: LookupFailureMode::FailClosed,
    }
}

/// Everything a lifecycle test needs, sharing one key store and clock.
pub struct Fixture {
    pub auth: Authenticator,
    pub clock: Arc<ManualClock>,
    pub keys: KeyStore,
}

pub fn fixture_with(ledger: Arc<dyn RevocationLedger>, ttl: Duration) -> Fixture {
    let clock = Arc::new(ManualClock::at(t0()));
    let keys = KeyStore::new(KeyRing::new(vec![hmac_key("k1", 1)]).expect("ring"));
    let signer = TokenSigner::new(keys.clone(), ISSUER, AUDIENCE, ttl).expect("signer");
    let validator = TokenValidator::new(keys.clone(), ValidationOptions::new(ISSUER, AUDIENCE));
    let guard = LedgerGuard::new(ledger, fast_policy());
    let auth = Authenticator::new(keys.clone(), signer, validator, guard, clock.clone());
    Fixture { auth, clock, keys }
}

pub fn fixture(ttl: Duration) -> (Fixture, Arc<InMemoryRevocationLedger>) {
    let ledger = Arc::new(InMemoryRevocationLedger::new());
    (fixture_with(ledger.clone(), ttl), ledger)
}

/// Identity provider backed by a fixed table.
#[derive(Default)]
pub struct StubProvider {
    users: HashMap<String, (String, Identity)>,
    refusals: HashMap<String, AuthFailure>,
    roles: HashMap<String, BTreeSet<String>>,
}

impl StubProvider {
    pub fn with_user(mut self, password: &str, identity: Identity) -> Self {
        self.roles
            .insert(identity.user_id().to_string(), identity.roles().clone());
        self.users.insert(
            identity.email().to_string(),
            (password.to_string(), identity),
        );
        self
    }

    pub fn with_refusal(mut self, email: &str, failure: AuthFailure) -> Self {
        self.refusals.insert(email.to_string(), failure);
        self
    }

    pub fn with_current_roles(mut self, user_id: &str, roles: &[&str]) -> Self {
        self.roles.insert(
            user_id.to_string(),
            roles.iter().map(|r| r.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthFailure> {
        if let Some(failure) = self.refusals.get(email) {
            return Err(failure.clone());
        }
        match self.users.get(email) {
            Some((expected, identity)) if expected == password => Ok(identity.clone()),
            _ => Err(AuthFailure::InvalidCredentials),
        }
    }

    async fn roles(&self, user_id: &str) -> Result<BTreeSet<String>, AuthFailure> {
        self.roles
            .get(user_id)
            .cloned()
            .ok_or(AuthFailure::InvalidCredentials)
    }
}

/// Ledger whose every call fails.
pub struct FailingLedger;

#[async_trait]
impl RevocationLedger for FailingLedger {
    async fn revoke(&self, _: &str, _: OffsetDateTime) -> Result<RevokeOutcome, LedgerError> {
        Err(LedgerError::unavailable("connection refused"))
    }

    async fn is_revoked(&self, _: &str) -> Result<bool, LedgerError> {
        Err(LedgerError::unavailable("connection refused"))
    }

    async fn purge_revoked_before(&self, _: OffsetDateTime) -> Result<u64, LedgerError> {
        Err(LedgerError::unavailable("connection refused"))
    }

    async fn len(&self) -> Result<u64, LedgerError> {
        Err(LedgerError::unavailable("connection refused"))
    }
}

/// Ledger that answers correctly, but only after `delay`.
pub struct SlowLedger {
    pub inner: InMemoryRevocationLedger,
    pub delay: StdDuration,
}

#[async_trait]
impl RevocationLedger for SlowLedger {
    async fn revoke(
        &self,
        jti: &str,
        revoked_at: OffsetDateTime,
    ) -> Result<RevokeOutcome, LedgerError> {
        tokio::time::sleep(self.delay).await;
        self.inner.revoke(jti, revoked_at).await
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, LedgerError> {
        tokio::time::sleep(self.delay).await;
        self.inner.is_revoked(jti).await
    }

    async fn purge_revoked_before(&self, cutoff: OffsetDateTime) -> Result<u64, LedgerError> {
        tokio::time::sleep(self.delay).await;
        self.inner.purge_revoked_before(cutoff).await
    }

    async fn len(&self) -> Result<u64, LedgerError> {
        self.inner.len().await
    }
}
