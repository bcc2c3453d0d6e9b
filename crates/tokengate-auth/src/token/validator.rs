//! Token validation.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. structure (three base64url segments, known header, complete payload)
//! 2. signature, against every key of the live ring that fits the header
//! 3. expiry (`now >= exp`)
//! 4. not-before (`now < iat`, or `now < nbf` when present)
//! 5. issuer and audience, each only when enforced
//!
//! The validator never consults the revocation ledger. Callers that accept
//! tokens should go through [`crate::Authenticator::authenticate`], which
//! composes both steps.

use std::collections::HashSet;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Validation, decode, decode_header};
use time::{Duration, OffsetDateTime};

use super::claims::{ClaimSet, TokenClaims};
use super::keys::{KeyStore, SigningAlgorithm};
use crate::AuthResult;
use crate::error::AuthError;
use crate::identity::Identity;

/// Expected issuer and audience plus enforcement switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Expected `iss`.
    pub issuer: String,
    /// Expected member of `aud`.
    pub audience: String,
    /// Reject tokens whose `iss` differs.
    pub enforce_issuer: bool,
    /// Reject tokens whose `aud` does not contain `audience`.
    pub enforce_audience: bool,
    /// Tolerance applied to both temporal checks.
    pub leeway: Duration,
}

impl ValidationOptions {
    /// Enforces both issuer and audience with zero leeway.
    #[must_use]
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            enforce_issuer: true,
            enforce_audience: true,
            leeway: Duration::ZERO,
        }
    }
}

/// Claims extracted from a token that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedToken {
    /// Identity claims, in issuance order.
    pub claims: ClaimSet,
    /// Token identifier.
    pub jti: String,
    /// Key that verified the signature.
    pub kid: String,
    /// `iat`.
    pub issued_at: OffsetDateTime,
    /// `exp`.
    pub expires_at: OffsetDateTime,
}

impl ValidatedToken {
    /// Identity described by the token.
    #[must_use]
    pub fn identity(&self) -> Identity {
        self.claims.to_identity()
    }
}

/// Verifies tokens against the live key ring.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    keys: KeyStore,
    options: ValidationOptions,
}

impl TokenValidator {
    /// Creates a validator.
    #[must_use]
    pub fn new(keys: KeyStore, options: ValidationOptions) -> Self {
        Self { keys, options }
    }

    /// Validation options in effect.
    #[must_use]
    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Validates `token` at instant `now`.
    ///
    /// # Errors
    ///
    /// Returns the first failing check: [`AuthError::MalformedToken`],
    /// [`AuthError::InvalidSignature`], [`AuthError::TokenExpired`],
    /// [`AuthError::TokenNotYetValid`], [`AuthError::IssuerMismatch`] or
    /// [`AuthError::AudienceMismatch`].
    pub fn validate(&self, token: &str, now: OffsetDateTime) -> AuthResult<ValidatedToken> {
        let result = self.run_checks(token, now);
        if let Err(e) = &result {
            tracing::debug!(error = %e, "Token rejected");
        }
        result
    }

    fn run_checks(&self, token: &str, now: OffsetDateTime) -> AuthResult<ValidatedToken> {
        let (algorithm, kid, claims) = parse_structure(token)?;
        let verified_by = self.verify_signature(token, algorithm, kid.as_deref())?;
        self.check_timing(&claims, now)?;
        self.check_addressing(&claims)?;

        let issued_at = OffsetDateTime::from_unix_timestamp(claims.iat)
            .map_err(|_| AuthError::malformed("iat out of range"))?;
        let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
            .map_err(|_| AuthError::malformed("exp out of range"))?;

        Ok(ValidatedToken {
            claims: claims.claim_set(),
            jti: claims.jti,
            kid: verified_by,
            issued_at,
            expires_at,
        })
    }

    /// Tries each candidate key; returns the kid that verified.
    fn verify_signature(
        &self,
        token: &str,
        algorithm: SigningAlgorithm,
        kid: Option<&str>,
    ) -> AuthResult<String> {
        let ring = self.keys.current();

        // Timing and addressing are checked separately against the injected clock.
        let mut validation = Validation::new(algorithm.to_jwt_algorithm());
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        for key in ring.candidates(kid, algorithm) {
            match decode::<TokenClaims>(token, key.decoding_key(), &validation) {
                Ok(_) => return Ok(key.kid().to_string()),
                Err(e) => match e.kind() {
                    ErrorKind::InvalidSignature => {}
                    other => {
                        tracing::trace!(kid = %key.kid(), error = ?other, "Key could not verify token");
                    }
                },
            }
        }

        Err(AuthError::InvalidSignature)
    }

    fn check_timing(&self, claims: &TokenClaims, now: OffsetDateTime) -> AuthResult<()> {
        let now = now.unix_timestamp();
        let leeway = self.options.leeway.whole_seconds();

        if now >= claims.exp.saturating_add(leeway) {
            return Err(AuthError::TokenExpired);
        }
        let not_before = claims.nbf.map_or(claims.iat, |nbf| nbf.max(claims.iat));
        if now < not_before.saturating_sub(leeway) {
            return Err(AuthError::TokenNotYetValid);
        }
        Ok(())
    }

    fn check_addressing(&self, claims: &TokenClaims) -> AuthResult<()> {
        if self.options.enforce_issuer && claims.iss != self.options.issuer {
            return Err(AuthError::issuer_mismatch(claims.iss.as_str()));
        }
        if self.options.enforce_audience && !claims.aud.contains(&self.options.audience) {
            return Err(AuthError::AudienceMismatch);
        }
        Ok(())
    }
}

/// Parses header and payload without touching the signature.
fn parse_structure(token: &str) -> AuthResult<(SigningAlgorithm, Option<String>, TokenClaims)> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments[0].is_empty() || segments[1].is_empty() {
        return Err(AuthError::malformed(
            "expected three dot-separated segments",
        ));
    }

    let header =
        decode_header(token).map_err(|e| AuthError::malformed(format!("invalid header: {e}")))?;
    let Some(algorithm) = SigningAlgorithm::from_jwt_algorithm(header.alg) else {
        // No configured key can carry this algorithm.
        return Err(AuthError::InvalidSignature);
    };

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1])
        .map_err(|e| AuthError::malformed(format!("invalid payload encoding: {e}")))?;
    let claims: TokenClaims = serde_json::from_slice(&payload)
        .map_err(|e| AuthError::malformed(format!("invalid payload: {e}")))?;

    if claims.sub.is_empty() {
        return Err(AuthError::malformed("sub is empty"));
    }
    if claims.jti.is_empty() {
        return Err(AuthError::malformed("jti is empty"));
    }

    Ok((algorithm, header.kid, claims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::claims::build_claims;
    use crate::token::keys::{KeyRing, SigningKey};
    use crate::token::signer::TokenSigner;
    use time::macros::datetime;

    const ISSUER: &str = "https://localhost:44327/";
    const AUDIENCE: &str = "https://localhost:44327/";

    fn hmac(kid: &str, byte: u8) -> SigningKey {
        SigningKey::hmac(kid, SigningAlgorithm::HS256, &[byte; 32]).unwrap()
    }

    fn setup() -> (TokenSigner, TokenValidator) {
        let store = KeyStore::new(KeyRing::new(vec![hmac("k1", 1)]).unwrap());
        let signer =
            TokenSigner::new(store.clone(), ISSUER, AUDIENCE, Duration::hours(1)).unwrap();
        let validator = TokenValidator::new(store, ValidationOptions::new(ISSUER, AUDIENCE));
        (signer, validator)
    }

    fn identity() -> Identity {
        Identity::new("user-1", "a@x.com", ["Admin"]).with_display_name("Ada")
    }

    #[test]
    fn test_round_trip() {
        let (signer, validator) = setup();
        let t0 = datetime!(2024-05-01 09:00 UTC);
        let claims = build_claims(&identity()).unwrap();
        let issued = signer.sign(&claims, t0).unwrap();

        let validated = validator.validate(&issued.token, t0).unwrap();
        assert_eq!(validated.claims, claims);
        assert_eq!(validated.jti, issued.jti);
        assert_eq!(validated.kid, "k1");
        assert_eq!(validated.identity(), identity());
        assert_eq!(validated.expires_at, issued.expires_at);
    }

    #[test]
    fn test_expiry_boundary() {
        let (signer, validator) = setup();
        let t0 = datetime!(2024-05-01 09:00 UTC);
        let issued = signer.sign(&build_claims(&identity()).unwrap(), t0).unwrap();

        assert!(validator.validate(&issued.token, t0 + Duration::minutes(30)).is_ok());
        assert!(
            validator
                .validate(&issued.token, t0 + Duration::hours(1) - Duration::seconds(1))
                .is_ok()
        );
        assert!(matches!(
            validator.validate(&issued.token, t0 + Duration::hours(1)),
            Err(AuthError::TokenExpired)
        ));
        assert!(matches!(
            validator.validate(&issued.token, t0 + Duration::minutes(61)),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_not_yet_valid() {
        let (signer, validator) = setup();
        let t0 = datetime!(2024-05-01 09:00 UTC);
        let issued = signer.sign(&build_claims(&identity()).unwrap(), t0).unwrap();

        assert!(matches!(
            validator.validate(&issued.token, t0 - Duration::seconds(1)),
            Err(AuthError::TokenNotYetValid)
        ));
    }

    #[test]
    fn test_leeway_widens_both_bounds() {
        let (signer, validator) = setup();
        let mut options = validator.options().clone();
        options.leeway = Duration::seconds(30);
        let lenient = TokenValidator::new(validator.keys.clone(), options);

        let t0 = datetime!(2024-05-01 09:00 UTC);
        let issued = signer.sign(&build_claims(&identity()).unwrap(), t0).unwrap();

        assert!(lenient.validate(&issued.token, t0 - Duration::seconds(20)).is_ok());
        assert!(
            lenient
                .validate(&issued.token, t0 + Duration::hours(1) + Duration::seconds(20))
                .is_ok()
        );
        assert!(matches!(
            lenient.validate(&issued.token, t0 + Duration::hours(1) + Duration::seconds(30)),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_expired_wins_over_audience() {
        let (signer, _) = setup();
        let store = KeyStore::new(KeyRing::new(vec![hmac("k1", 1)]).unwrap());
        let validator = TokenValidator::new(store, ValidationOptions::new(ISSUER, "other"));
        let t0 = datetime!(2024-05-01 09:00 UTC);
        let issued = signer.sign(&build_claims(&identity()).unwrap(), t0).unwrap();

        assert!(matches!(
            validator.validate(&issued.token, t0 + Duration::hours(2)),
            Err(AuthError::TokenExpired)
        ));
        assert!(matches!(
            validator.validate(&issued.token, t0),
            Err(AuthError::AudienceMismatch)
        ));
    }

    #[test]
    fn test_issuer_and_audience_enforcement_switches() {
        let (signer, _) = setup();
        let store = KeyStore::new(KeyRing::new(vec![hmac("k1", 1)]).unwrap());
        let t0 = datetime!(2024-05-01 09:00 UTC);
        let issued = signer.sign(&build_claims(&identity()).unwrap(), t0).unwrap();

        let strict = TokenValidator::new(
            store.clone(),
            ValidationOptions::new("https://elsewhere/", "https://nobody/"),
        );
        match strict.validate(&issued.token, t0) {
            Err(AuthError::IssuerMismatch { found }) => assert_eq!(found, ISSUER),
            other => panic!("expected issuer mismatch, got {other:?}"),
        }

        let mut options = ValidationOptions::new("https://elsewhere/", "https://nobody/");
        options.enforce_issuer = false;
        options.enforce_audience = false;
        let relaxed = TokenValidator::new(store, options);
        assert!(relaxed.validate(&issued.token, t0).is_ok());
    }

    #[test]
    fn test_missing_audience_only_matters_when_enforced() {
        let t0 = datetime!(2024-05-01 09:00 UTC);
        let iat = t0.unix_timestamp();
        let payload = serde_json::json!({
            "sub": "user-1",
            "email": "a@x.com",
            "jti": "no-aud",
            "iat": iat,
            "exp": iat + 3600,
        });
        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
        header.kid = Some("k1".to_string());
        let token = jsonwebtoken::encode(
            &header,
            &payload,
            &jsonwebtoken::EncodingKey::from_secret(&[1; 32]),
        )
        .unwrap();

        let store = KeyStore::new(KeyRing::new(vec![hmac("k1", 1)]).unwrap());
        let mut options = ValidationOptions::new(ISSUER, AUDIENCE);
        options.enforce_issuer = false;
        options.enforce_audience = false;
        let relaxed = TokenValidator::new(store.clone(), options.clone());
        let validated = relaxed.validate(&token, t0).unwrap();
        assert_eq!(validated.jti, "no-aud");

        options.enforce_audience = true;
        let strict = TokenValidator::new(store, options);
        assert!(matches!(
            strict.validate(&token, t0),
            Err(AuthError::AudienceMismatch)
        ));
    }

    #[test]
    fn test_malformed_inputs() {
        let (_, validator) = setup();
        let now = datetime!(2024-05-01 09:00 UTC);

        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.???.sig", "..sig"] {
            assert!(
                matches!(
                    validator.validate(token, now),
                    Err(AuthError::MalformedToken { .. })
                ),
                "{token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_payload_missing_jti_is_malformed() {
        let (_, validator) = setup();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            br#"{"iss":"i","aud":"a","sub":"u","email":"e","iat":1,"exp":2}"#,
        );
        let token = format!("{header}.{payload}.c2ln");

        assert!(matches!(
            validator.validate(&token, datetime!(2024-05-01 09:00 UTC)),
            Err(AuthError::MalformedToken { .. })
        ));
    }

    #[test]
    fn test_wrong_key_is_invalid_signature() {
        let (signer, _) = setup();
        let other = KeyStore::new(KeyRing::new(vec![hmac("k1", 2)]).unwrap());
        let validator = TokenValidator::new(other, ValidationOptions::new(ISSUER, AUDIENCE));
        let t0 = datetime!(2024-05-01 09:00 UTC);
        let issued = signer.sign(&build_claims(&identity()).unwrap(), t0).unwrap();

        assert!(matches!(
            validator.validate(&issued.token, t0),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_payload_fails_signature() {
        let (signer, validator) = setup();
        let t0 = datetime!(2024-05-01 09:00 UTC);
        let issued = signer.sign(&build_claims(&identity()).unwrap(), t0).unwrap();

        let segments: Vec<&str> = issued.token.split('.').collect();
        let mut payload: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments[1]).unwrap()).unwrap();
        payload["role"] = serde_json::json!(["Admin", "Root"]);
        let forged = format!(
            "{}.{}.{}",
            segments[0],
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap()),
            segments[2]
        );

        assert!(matches!(
            validator.validate(&forged, t0),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_unknown_kid_still_tries_ring() {
        let (signer, validator) = setup();
        let t0 = datetime!(2024-05-01 09:00 UTC);
        let issued = signer.sign(&build_claims(&identity()).unwrap(), t0).unwrap();

        // Rewrite the header kid; the signature covers the header, so this
        // must fail even though the ring is searched.
        let segments: Vec<&str> = issued.token.split('.').collect();
        let header = URL_SAFE_NO_PAD.encode(br#"{"typ":"JWT","alg":"HS256","kid":"zzz"}"#);
        let token = format!("{header}.{}.{}", segments[1], segments[2]);
        assert!(matches!(
            validator.validate(&token, t0),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_ec_signed_round_trip() {
        let store = KeyStore::new(KeyRing::new(vec![SigningKey::generate_ec("ec").unwrap()]).unwrap());
        let signer = TokenSigner::new(store.clone(), ISSUER, AUDIENCE, Duration::hours(1)).unwrap();
        let validator = TokenValidator::new(store, ValidationOptions::new(ISSUER, AUDIENCE));
        let t0 = datetime!(2024-05-01 09:00 UTC);
        let issued = signer.sign(&build_claims(&identity()).unwrap(), t0).unwrap();

        let validated = validator.validate(&issued.token, t0).unwrap();
        assert_eq!(validated.kid, "ec");
    }
}
