//! # tokengate-auth
//!
//! Bearer token issuance, validation and revocation.
//!
//! This crate provides:
//! - Deterministic claim construction from verified identities
//! - Token signing with HMAC, RSA or EC keys and live key rotation
//! - Ordered, short-circuiting token validation
//! - A revocation ledger with timeouts, bounded retry and fail-closed lookups
//! - A combined [`Authenticator`] that always checks revocation
//!
//! ## Overview
//!
//! Credential checks happen in an external [`IdentityProvider`]. The verified
//! identity is turned into claims, signed into a compact JWS carrying a fresh
//! `jti`, and later presented back. Authentication validates the token and
//! then asks the [`RevocationLedger`] whether its `jti` was revoked.
//!
//! ## Modules
//!
//! - [`clock`] - Injectable time source
//! - [`identity`] - Verified identities and the identity provider boundary
//! - [`token`] - Claims, keys, signing and validation
//! - [`revocation`] - Revocation ledger, guarded access and sweeping
//! - [`authenticator`] - Combined login / authenticate / revoke entry point
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Error taxonomy

pub mod authenticator;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod revocation;
pub mod token;

pub use authenticator::{AuthenticatedUser, Authenticator, extract_bearer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, ConfigError, LedgerConfig, SigningConfig, SigningKeyConfig};
pub use error::{AuthError, ErrorCategory, INVALID_TOKEN_MESSAGE};
pub use identity::{AuthFailure, Identity, IdentityProvider};
pub use revocation::{
    GuardPolicy, InMemoryRevocationLedger, LedgerError, LedgerGuard, LookupFailureMode,
    RevocationEntry, RevocationLedger, RevocationSweeper, RevokeOutcome,
};
pub use token::{
    Claim, ClaimSet, ClaimType, IssuedToken, KeyRing, KeyStore, SigningAlgorithm, SigningKey,
    TokenClaims, TokenSigner, TokenValidator, ValidatedToken, ValidationOptions, build_claims,
};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tokengate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::authenticator::{AuthenticatedUser, Authenticator};
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::config::AuthConfig;
    pub use crate::error::AuthError;
    pub use crate::identity::{AuthFailure, Identity, IdentityProvider};
    pub use crate::revocation::{RevocationLedger, RevokeOutcome};
    pub use crate::token::{IssuedToken, KeyStore, SigningKey};
}
