//! Token signing.
//!
//! The signer turns a [`ClaimSet`] into a compact JWS using the newest key in
//! the live [`KeyStore`]. Apart from the generated `jti`, output depends only
//! on the inputs and the supplied instant.

use jsonwebtoken::{Header, encode};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::claims::{ClaimSet, TokenClaims};
use super::keys::KeyStore;
use crate::AuthResult;
use crate::error::AuthError;

/// A freshly issued token.
#[derive(Clone)]
pub struct IssuedToken {
    /// Serialized token (`header.payload.signature`).
    pub token: String,
    /// Unique token identifier; pass it to revocation.
    pub jti: String,
    /// Key that signed the token.
    pub kid: String,
    /// Issuance instant (whole seconds).
    pub issued_at: OffsetDateTime,
    /// Expiration instant.
    pub expires_at: OffsetDateTime,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("jti", &self.jti)
            .field("kid", &self.kid)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Signs claim sets into bearer tokens.
#[derive(Debug, Clone)]
pub struct TokenSigner {
    keys: KeyStore,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl TokenSigner {
    /// Creates a signer.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `ttl` is not positive or the issuer
    /// or audience is empty.
    pub fn new(
        keys: KeyStore,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        ttl: Duration,
    ) -> AuthResult<Self> {
        let issuer = issuer.into();
        let audience = audience.into();
        if issuer.is_empty() {
            return Err(AuthError::configuration("issuer must not be empty"));
        }
        if audience.is_empty() {
            return Err(AuthError::configuration("audience must not be empty"));
        }
        if !ttl.is_positive() {
            return Err(AuthError::configuration("token_ttl must be positive"));
        }
        Ok(Self {
            keys,
            issuer,
            audience,
            ttl,
        })
    }

    /// Token lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Signs `claims` with a new random `jti`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if encoding fails.
    pub fn sign(&self, claims: &ClaimSet, now: OffsetDateTime) -> AuthResult<IssuedToken> {
        self.sign_with_jti(claims, Uuid::new_v4().to_string(), now)
    }

    /// Signs `claims` with a caller-chosen `jti`.
    ///
    /// Identical inputs and instant produce an identical token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if encoding fails.
    pub fn sign_with_jti(
        &self,
        claims: &ClaimSet,
        jti: impl Into<String>,
        now: OffsetDateTime,
    ) -> AuthResult<IssuedToken> {
        let jti = jti.into();
        let iat = now.unix_timestamp();
        let exp = iat
            .checked_add(self.ttl.whole_seconds())
            .ok_or_else(|| AuthError::internal("token expiry overflows"))?;

        let payload = TokenClaims {
            iss: self.issuer.clone(),
            aud: vec![self.audience.clone()],
            sub: claims.subject().to_string(),
            email: claims.email().to_string(),
            name: claims.name().map(str::to_string),
            role: claims.roles().map(str::to_string).collect(),
            jti: jti.clone(),
            iat,
            nbf: Some(iat),
            exp,
        };

        let ring = self.keys.current();
        let key = ring.signing_key();
        let mut header = Header::new(key.algorithm().to_jwt_algorithm());
        header.kid = Some(key.kid().to_string());

        let token = encode(&header, &payload, key.encoding_key())
            .map_err(|e| AuthError::internal(format!("token encoding failed: {e}")))?;

        let issued_at = OffsetDateTime::from_unix_timestamp(iat)
            .map_err(|e| AuthError::internal(e.to_string()))?;
        let expires_at = OffsetDateTime::from_unix_timestamp(exp)
            .map_err(|e| AuthError::internal(e.to_string()))?;

        tracing::debug!(jti = %jti, kid = %key.kid(), exp, "Issued token");

        Ok(IssuedToken {
            token,
            jti,
            kid: key.kid().to_string(),
            issued_at,
            expires_at,
        })
    }
}
