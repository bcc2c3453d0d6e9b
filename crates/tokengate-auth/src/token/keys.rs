//! Signing keys, key rings and live key rotation.
//!
//! Tokens are signed with HMAC secrets by default. RSA and EC key pairs are
//! accepted through the same [`SigningKey`] type, so switching a deployment
//! to asymmetric signing is a configuration change.
//!
//! ## Rotation
//!
//! A [`KeyRing`] is an immutable, ordered list of keys. The newest (last) key
//! signs; every key in the ring verifies. Rotation never edits a ring in
//! place: [`KeyStore`] swaps in a whole new ring atomically, so in-flight
//! validations keep the snapshot they started with.
//!
//! ```ignore
//! let store = KeyStore::new(KeyRing::new(vec![old_key])?);
//! store.append(new_key)?;     // sign with new, still accept old
//! store.retire_oldest()?;     // old tokens now fail with InvalidSignature
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::EncodePrivateKey;
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};

use crate::AuthResult;
use crate::error::AuthError;

/// Minimum HMAC secret length in bytes.
pub const MIN_HMAC_SECRET_LEN: usize = 32;

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms for tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256.
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    HS512,
    /// RSA with SHA-256.
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS384 => Algorithm::HS384,
            Self::HS512 => Algorithm::HS512,
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Maps a `jsonwebtoken` algorithm back, if supported.
    #[must_use]
    pub fn from_jwt_algorithm(algorithm: Algorithm) -> Option<Self> {
        match algorithm {
            Algorithm::HS256 => Some(Self::HS256),
            Algorithm::HS384 => Some(Self::HS384),
            Algorithm::HS512 => Some(Self::HS512),
            Algorithm::RS256 => Some(Self::RS256),
            Algorithm::RS384 => Some(Self::RS384),
            Algorithm::ES384 => Some(Self::ES384),
            _ => None,
        }
    }

    /// Returns the algorithm name as used in JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this is a symmetric HMAC algorithm.
    #[must_use]
    pub fn is_hmac(&self) -> bool {
        matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }

    /// Returns `true` if this is an EC-based algorithm.
    #[must_use]
    pub fn is_ec(&self) -> bool {
        matches!(self, Self::ES384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "ES384" => Ok(Self::ES384),
            other => Err(AuthError::configuration(format!(
                "Invalid signing algorithm: '{other}'. Must be HS256, HS384, HS512, RS256, RS384, or ES384"
            ))),
        }
    }
}

// ============================================================================
// Signing Key
// ============================================================================

/// A key that can sign and verify tokens.
pub struct SigningKey {
    kid: String,
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Creates an HMAC key from a shared secret.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::WeakKey`] if the secret is shorter than
    /// [`MIN_HMAC_SECRET_LEN`] bytes, or a configuration error if
    /// `algorithm` is not an HMAC algorithm.
    pub fn hmac(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        secret: &[u8],
    ) -> AuthResult<Self> {
        let kid = kid.into();
        if !algorithm.is_hmac() {
            return Err(AuthError::configuration(format!(
                "Algorithm {algorithm} is not HMAC-based"
            )));
        }
        if secret.len() < MIN_HMAC_SECRET_LEN {
            return Err(AuthError::weak_key(kid, secret.len(), MIN_HMAC_SECRET_LEN));
        }

        Ok(Self {
            kid,
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        })
    }

    /// Generates a random HMAC secret of `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::WeakKey`] if `len` is below the minimum.
    pub fn generate_hmac(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        len: usize,
    ) -> AuthResult<Self> {
        Self::hmac(kid, algorithm, &random_secret(len))
    }

    /// Loads an asymmetric key pair from PEM strings.
    ///
    /// RSA keys accept PKCS#1 or PKCS#8 PEM; EC keys expect a PKCS#8 private
    /// key and an SPKI public key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the PEM data is invalid or the
    /// algorithm is HMAC-based.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> AuthResult<Self> {
        let invalid = |e: jsonwebtoken::errors::Error| {
            AuthError::configuration(format!("Invalid {algorithm} key: {e}"))
        };

        let (encoding_key, decoding_key) = if algorithm.is_rsa() {
            (
                EncodingKey::from_rsa_pem(private_pem.as_bytes()).map_err(invalid)?,
                DecodingKey::from_rsa_pem(public_pem.as_bytes()).map_err(invalid)?,
            )
        } else if algorithm.is_ec() {
            (
                EncodingKey::from_ec_pem(private_pem.as_bytes()).map_err(invalid)?,
                DecodingKey::from_ec_pem(public_pem.as_bytes()).map_err(invalid)?,
            )
        } else {
            return Err(AuthError::configuration(format!(
                "Algorithm {algorithm} uses a shared secret, not a PEM key pair"
            )));
        };

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
        })
    }

    /// Generates a new 2048-bit RSA key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails or `algorithm` is not RSA-based.
    pub fn generate_rsa(kid: impl Into<String>, algorithm: SigningAlgorithm) -> AuthResult<Self> {
        if !algorithm.is_rsa() {
            return Err(AuthError::configuration(format!(
                "Algorithm {algorithm} is not RSA-based"
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| AuthError::internal(format!("RSA key generation failed: {e}")))?;
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthError::internal(e.to_string()))?;
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::internal(e.to_string()))?;

        Self::from_pem(kid, algorithm, &private_pem, &public_pem)
    }

    /// Generates a new EC key pair on the P-384 curve.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate_ec(kid: impl Into<String>) -> AuthResult<Self> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let signing_key = EcSigningKey::from(&secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| AuthError::internal("Missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| AuthError::internal("Missing y coordinate"))?;

        // jsonwebtoken wants PKCS#8 for the private half
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthError::internal(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| AuthError::internal(e.to_string()))?;

        let x_b64 = URL_SAFE_NO_PAD.encode(x.as_slice());
        let y_b64 = URL_SAFE_NO_PAD.encode(y.as_slice());
        let decoding_key = DecodingKey::from_ec_components(&x_b64, &y_b64)
            .map_err(|e| AuthError::internal(e.to_string()))?;

        Ok(Self {
            kid: kid.into(),
            algorithm: SigningAlgorithm::ES384,
            encoding_key,
            decoding_key,
        })
    }

    /// Key ID, written to the token header.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Returns `len` bytes from the operating system RNG.
#[must_use]
pub fn random_secret(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

// ============================================================================
// Key Ring
// ============================================================================

/// Immutable, ordered set of currently valid keys.
#[derive(Debug, Clone)]
pub struct KeyRing {
    keys: Vec<Arc<SigningKey>>,
}

impl KeyRing {
    /// Creates a ring from keys ordered oldest first.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `keys` is empty or two keys share a
    /// `kid`.
    pub fn new(keys: Vec<SigningKey>) -> AuthResult<Self> {
        Self::from_shared(keys.into_iter().map(Arc::new).collect())
    }

    fn from_shared(keys: Vec<Arc<SigningKey>>) -> AuthResult<Self> {
        if keys.is_empty() {
            return Err(AuthError::configuration(
                "at least one signing key is required",
            ));
        }
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].iter().any(|k| k.kid == key.kid) {
                return Err(AuthError::configuration(format!(
                    "duplicate key id '{}'",
                    key.kid
                )));
            }
        }
        Ok(Self { keys })
    }

    /// The key used for new signatures (the newest one).
    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        // from_shared guarantees at least one key
        &self.keys[self.keys.len() - 1]
    }

    /// All keys, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &SigningKey> {
        self.keys.iter().map(AsRef::as_ref)
    }

    /// Number of keys in the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always `false`; rings are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Looks up a key by ID.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&SigningKey> {
        self.keys().find(|k| k.kid == kid)
    }

    /// Keys able to verify a token with the given header values.
    ///
    /// Only keys of the matching algorithm are returned. A key whose ID
    /// matches `kid` comes first; the rest follow newest first.
    #[must_use]
    pub fn candidates(&self, kid: Option<&str>, algorithm: SigningAlgorithm) -> Vec<&SigningKey> {
        let mut matching: Vec<&SigningKey> = self
            .keys
            .iter()
            .rev()
            .map(AsRef::as_ref)
            .filter(|k| k.algorithm == algorithm)
            .collect();
        if let Some(kid) = kid
            && let Some(pos) = matching.iter().position(|k| k.kid == kid)
        {
            let hinted = matching.remove(pos);
            matching.insert(0, hinted);
        }
        matching
    }

    /// Returns a new ring with `key` appended as the signing key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key ID is already present.
    pub fn with_appended(&self, key: SigningKey) -> AuthResult<Self> {
        let mut keys = self.keys.clone();
        keys.push(Arc::new(key));
        Self::from_shared(keys)
    }

    /// Returns a new ring without its oldest key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if only one key remains.
    pub fn without_oldest(&self) -> AuthResult<Self> {
        if self.keys.len() < 2 {
            return Err(AuthError::configuration(
                "cannot retire the only signing key",
            ));
        }
        Self::from_shared(self.keys[1..].to_vec())
    }
}

// ============================================================================
// Key Store
// ============================================================================

/// Live key ring shared by signers and validators.
///
/// Reads are a single atomic load. Writers are serialized among themselves
/// and publish a complete new ring.
#[derive(Clone)]
pub struct KeyStore {
    ring: Arc<ArcSwap<KeyRing>>,
    write_lock: Arc<Mutex<()>>,
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("ring", &self.ring.load())
            .finish()
    }
}

impl KeyStore {
    /// Creates a store holding `ring`.
    #[must_use]
    pub fn new(ring: KeyRing) -> Self {
        Self {
            ring: Arc::new(ArcSwap::from_pointee(ring)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Snapshot of the current ring.
    #[must_use]
    pub fn current(&self) -> Arc<KeyRing> {
        self.ring.load_full()
    }

    /// Replaces the whole ring.
    pub fn rotate(&self, ring: KeyRing) {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        self.publish(ring);
    }

    /// Appends a new signing key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key ID is already present.
    pub fn append(&self, key: SigningKey) -> AuthResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let next = self.ring.load().with_appended(key)?;
        self.publish(next);
        Ok(())
    }

    /// Drops the oldest key; tokens signed only by it stop validating.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if only one key remains.
    pub fn retire_oldest(&self) -> AuthResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let next = self.ring.load().without_oldest()?;
        self.publish(next);
        Ok(())
    }

    fn publish(&self, ring: KeyRing) {
        let kids: Vec<&str> = ring.keys().map(SigningKey::kid).collect();
        tracing::info!(
            signing_kid = ring.signing_key().kid(),
            kids = ?kids,
            "Signing key ring rotated"
        );
        self.ring.store(Arc::new(ring));
    }
}
