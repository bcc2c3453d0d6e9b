//! Combined entry point for the token lifecycle.
//!
//! [`Authenticator`] owns the signer, the validator and the guarded
//! revocation ledger. [`Authenticator::authenticate`] always runs signature
//! and timing validation *and* the revocation lookup, so request handlers
//! cannot skip the second step by accident.
//!
//! ```ignore
//! let auth = Authenticator::from_config(&config, ledger, Arc::new(SystemClock))?
//!     .with_identity_provider(provider);
//!
//! let issued = auth.login("a@x.com", "hunter2").await?;
//! let user = auth.authenticate(&issued.token).await?;
//! user.require_role("Admin")?;
//! auth.revoke(&issued.jti).await?;
//! ```

use std::sync::Arc;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::identity::{Identity, IdentityProvider};
use crate::revocation::{LedgerGuard, RevocationLedger, RevocationSweeper, RevokeOutcome};
use crate::token::{IssuedToken, KeyStore, TokenSigner, TokenValidator, build_claims};

/// Caller identity established from a valid, unrevoked token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Identity described by the token claims.
    pub identity: Identity,
    /// Token identifier.
    pub jti: String,
    /// Token expiration.
    pub expires_at: OffsetDateTime,
}

impl AuthenticatedUser {
    /// Fails with [`AuthError::Forbidden`] unless the user holds `role`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] if the role is missing.
    pub fn require_role(&self, role: &str) -> AuthResult<()> {
        if self.identity.has_role(role) {
            Ok(())
        } else {
            Err(AuthError::forbidden(format!("role '{role}' required")))
        }
    }

    /// Fails with [`AuthError::Forbidden`] unless the user holds one of `roles`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] if none of the roles is held.
    pub fn require_any_role(&self, roles: &[&str]) -> AuthResult<()> {
        if roles.iter().any(|r| self.identity.has_role(r)) {
            Ok(())
        } else {
            Err(AuthError::forbidden(format!(
                "one of roles [{}] required",
                roles.join(", ")
            )))
        }
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
#[must_use]
pub fn extract_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Issues, authenticates and revokes bearer tokens.
#[derive(Clone)]
pub struct Authenticator {
    keys: KeyStore,
    signer: TokenSigner,
    validator: TokenValidator,
    ledger: LedgerGuard,
    clock: Arc<dyn Clock>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("signer", &self.signer)
            .field("validator", &self.validator)
            .field("ledger", &self.ledger)
            .field("identity_provider", &self.identity_provider.is_some())
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Builds an authenticator from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::WeakKey`] or [`AuthError::Configuration`] if the
    /// configuration is invalid.
    pub fn from_config(
        config: &AuthConfig,
        ledger: Arc<dyn RevocationLedger>,
        clock: Arc<dyn Clock>,
    ) -> AuthResult<Self> {
        config.validate()?;
        let keys = KeyStore::new(config.key_ring()?);
        let signer = TokenSigner::new(
            keys.clone(),
            config.issuer.as_str(),
            config.audience.as_str(),
            config.ttl(),
        )?;
        let validator = TokenValidator::new(keys.clone(), config.validation_options());
        let guard = LedgerGuard::new(ledger, config.ledger.guard_policy());

        tracing::info!(
            issuer = %config.issuer,
            keys = config.signing.keys.len(),
            ttl_secs = config.token_ttl.as_secs(),
            "Authenticator configured"
        );

        Ok(Self::new(keys, signer, validator, guard, clock))
    }

    /// Assembles an authenticator from parts.
    ///
    /// `signer` and `validator` should share `keys` so rotations apply to both.
    #[must_use]
    pub fn new(
        keys: KeyStore,
        signer: TokenSigner,
        validator: TokenValidator,
        ledger: LedgerGuard,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keys,
            signer,
            validator,
            ledger,
            clock,
            identity_provider: None,
        }
    }

    /// Attaches the identity provider used by [`login`](Self::login).
    #[must_use]
    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    /// Live key store; rotate keys through it.
    #[must_use]
    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Raw validator, without the revocation check.
    #[must_use]
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Token signer.
    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Guarded revocation ledger.
    #[must_use]
    pub fn ledger(&self) -> &LedgerGuard {
        &self.ledger
    }

    /// Verifies credentials and issues a token for the resulting identity.
    ///
    /// Roles are re-read from the provider so the token reflects the current
    /// role set.
    ///
    /// # Errors
    ///
    /// Passes through [`AuthError::InvalidCredentials`],
    /// [`AuthError::AccountLocked`] and [`AuthError::PasswordExpired`];
    /// returns [`AuthError::Configuration`] if no provider is attached.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<IssuedToken> {
        let provider = self
            .identity_provider
            .as_ref()
            .ok_or_else(|| AuthError::configuration("no identity provider configured"))?;

        let identity = provider
            .verify_credentials(email, password)
            .await
            .map_err(|failure| {
                tracing::info!(reason = %failure, "Login rejected");
                AuthError::from(failure)
            })?;
        let roles = provider.roles(identity.user_id()).await?;
        let identity = identity.with_roles(roles);

        let issued = self.issue(&identity)?;
        tracing::info!(user_id = %identity.user_id(), jti = %issued.jti, "User logged in");
        Ok(issued)
    }

    /// Issues a token for an already verified identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidIdentity`] if the identity is incomplete.
    pub fn issue(&self, identity: &Identity) -> AuthResult<IssuedToken> {
        let claims = build_claims(identity)?;
        self.signer.sign(&claims, self.clock.now())
    }

    /// Validates `token` and checks that it has not been revoked.
    ///
    /// # Errors
    ///
    /// Returns any validation error, [`AuthError::TokenRevoked`] for revoked
    /// tokens, or [`AuthError::StorageUnavailable`] when the ledger cannot
    /// confirm the token is unrevoked.
    pub async fn authenticate(&self, token: &str) -> AuthResult<AuthenticatedUser> {
        let validated = self.validator.validate(token, self.clock.now())?;

        if self.ledger.is_revoked(&validated.jti).await? {
            tracing::debug!(jti = %validated.jti, "Rejected revoked token");
            return Err(AuthError::TokenRevoked);
        }

        Ok(AuthenticatedUser {
            identity: validated.identity(),
            jti: validated.jti,
            expires_at: validated.expires_at,
        })
    }

    /// Revokes a token by identifier.
    ///
    /// Unknown identifiers are recorded too; tokens are opaque to the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageUnavailable`] if the ledger fails, or
    /// [`AuthError::MalformedToken`] for an empty `jti`.
    pub async fn revoke(&self, jti: &str) -> AuthResult<RevokeOutcome> {
        if jti.trim().is_empty() {
            return Err(AuthError::malformed("jti is required"));
        }
        self.ledger.revoke(jti, self.clock.now()).await
    }

    /// Validates a presented token and revokes its own `jti`.
    ///
    /// # Errors
    ///
    /// Returns any validation error, or [`AuthError::StorageUnavailable`].
    pub async fn revoke_token(&self, token: &str) -> AuthResult<RevokeOutcome> {
        let validated = self.validator.validate(token, self.clock.now())?;
        self.ledger.revoke(&validated.jti, self.clock.now()).await
    }

    /// Creates a sweeper that keeps entries for token lifetime plus leeway.
    #[must_use]
    pub fn sweeper(&self, interval: std::time::Duration) -> RevocationSweeper {
        RevocationSweeper::new(
            self.ledger.clone(),
            self.clock.clone(),
            self.signer.ttl() + self.validator.options().leeway,
            interval,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(extract_bearer("bearer   abc "), Some("abc"));
        assert_eq!(extract_bearer("Basic dXNlcjpwYXNz"), None);
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("abc"), None);
    }

    #[test]
    fn test_role_gating() {
        let user = AuthenticatedUser {
            identity: Identity::new("u1", "a@x.com", ["Student"]),
            jti: "j".into(),
            expires_at: OffsetDateTime::UNIX_EPOCH,
        };

        assert!(user.require_role("Student").is_ok());
        assert!(matches!(
            user.require_role("Admin"),
            Err(AuthError::Forbidden { .. })
        ));
        assert!(user.require_any_role(&["Admin", "Student"]).is_ok());
        assert!(matches!(
            user.require_any_role(&["Admin", "Teacher"]),
            Err(AuthError::Forbidden { .. })
        ));
    }
}
