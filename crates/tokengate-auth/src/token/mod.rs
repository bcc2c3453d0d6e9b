//! Token generation, validation, and key management.
//!
//! This module provides:
//!
//! - Claim construction from verified identities
//! - Signing keys, key rings and live key rotation
//! - Compact JWS encoding (header.payload.signature)
//! - Ordered, short-circuiting validation against the live key ring

pub mod claims;
pub mod keys;
pub mod signer;
pub mod validator;

pub use claims::{Claim, ClaimSet, ClaimType, TokenClaims, build_claims};
pub use keys::{KeyRing, KeyStore, MIN_HMAC_SECRET_LEN, SigningAlgorithm, SigningKey, random_secret};
pub use signer::{IssuedToken, TokenSigner};
pub use validator::{TokenValidator, ValidatedToken, ValidationOptions};
