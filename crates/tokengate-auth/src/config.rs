//! Token service configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! issuer = "https://auth.example.com/"
//! audience = "https://api.example.com/"
//! token_ttl = "1d"
//!
//! [[signing.keys]]
//! kid = "2024-01"
//! algorithm = "HS256"
//! secret = "c2VjcmV0LXNlY3JldC1zZWNyZXQtc2VjcmV0LXNlY3JldA"
//! secret_encoding = "base64"
//!
//! [ledger]
//! storage_timeout = "2s"
//! max_retry_attempts = 3
//! ```
//!
//! Every field can be overridden from the environment with the `TOKENGATE__`
//! prefix, e.g. `TOKENGATE__LEDGER__DATABASE_URL`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{Engine, engine::general_purpose};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::revocation::{GuardPolicy, LookupFailureMode};
use crate::token::{KeyRing, MIN_HMAC_SECRET_LEN, SigningAlgorithm, SigningKey, ValidationOptions};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "tokengate.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "TOKENGATE";

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Value of the `iss` claim.
    pub issuer: String,

    /// Value of the `aud` claim.
    pub audience: String,

    /// Token lifetime.
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,

    /// Reject tokens from other issuers.
    pub enforce_issuer: bool,

    /// Reject tokens addressed to other audiences.
    pub enforce_audience: bool,

    /// Clock skew tolerance for expiry and not-before checks.
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,

    /// Signing keys.
    pub signing: SigningConfig,

    /// Revocation ledger access.
    pub ledger: LedgerConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "https://localhost:44327/".to_string(),
            audience: "https://localhost:44327/".to_string(),
            token_ttl: Duration::from_secs(24 * 3600),
            enforce_issuer: true,
            enforce_audience: true,
            leeway: Duration::ZERO,
            signing: SigningConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

/// Signing key list; the last key signs, all keys verify.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Keys ordered oldest first.
    pub keys: Vec<SigningKeyConfig>,
}

/// How an inline HMAC secret is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretEncoding {
    /// Raw UTF-8 bytes.
    #[default]
    Utf8,
    /// Base64 (standard or URL-safe, padding optional).
    Base64,
}

/// A single signing key.
#[derive(Clone, Deserialize, Serialize)]
pub struct SigningKeyConfig {
    /// Key ID written to token headers.
    pub kid: String,

    /// Signing algorithm (HS256, HS384, HS512, RS256, RS384, ES384).
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Inline HMAC secret.
    #[serde(default)]
    pub secret: Option<String>,

    /// Encoding of `secret`.
    #[serde(default)]
    pub secret_encoding: SecretEncoding,

    /// PEM private key for RSA/EC algorithms.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// PEM public key for RSA/EC algorithms.
    #[serde(default)]
    pub public_key_path: Option<PathBuf>,
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

impl fmt::Debug for SigningKeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyConfig")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("secret_encoding", &self.secret_encoding)
            .field("private_key_path", &self.private_key_path)
            .field("public_key_path", &self.public_key_path)
            .finish()
    }
}

impl SigningKeyConfig {
    /// Creates an HS256 key entry with a base64 secret.
    #[must_use]
    pub fn hmac_base64(kid: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            algorithm: default_algorithm(),
            secret: Some(secret.into()),
            secret_encoding: SecretEncoding::Base64,
            private_key_path: None,
            public_key_path: None,
        }
    }

    fn parsed_algorithm(&self) -> Result<SigningAlgorithm, ConfigError> {
        self.algorithm
            .parse()
            .map_err(|e: AuthError| ConfigError::InvalidValue(format!("key '{}': {e}", self.kid)))
    }

    fn secret_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| ConfigError::Missing(format!("signing.keys[{}].secret", self.kid)))?;

        match self.secret_encoding {
            SecretEncoding::Utf8 => Ok(secret.as_bytes().to_vec()),
            SecretEncoding::Base64 => {
                let trimmed = secret.trim().trim_end_matches('=');
                general_purpose::STANDARD_NO_PAD
                    .decode(trimmed)
                    .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(trimmed))
                    .map_err(|e| {
                        ConfigError::InvalidValue(format!(
                            "key '{}': secret is not valid base64: {e}",
                            self.kid
                        ))
                    })
            }
        }
    }

    /// Builds the signing key, reading PEM files for asymmetric algorithms.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WeakKey`] for short HMAC secrets, or another
    /// [`ConfigError`] if the entry is incomplete or unreadable.
    pub fn to_signing_key(&self) -> Result<SigningKey, ConfigError> {
        let algorithm = self.parsed_algorithm()?;

        if algorithm.is_hmac() {
            let secret = self.secret_bytes()?;
            return SigningKey::hmac(&self.kid, algorithm, &secret).map_err(ConfigError::from);
        }

        let read = |path: &Option<PathBuf>, field: &str| -> Result<String, ConfigError> {
            let path = path
                .as_ref()
                .ok_or_else(|| ConfigError::Missing(format!("signing.keys[{}].{field}", self.kid)))?;
            std::fs::read_to_string(path).map_err(|e| {
                ConfigError::InvalidValue(format!("cannot read {}: {e}", path.display()))
            })
        };
        let private_pem = read(&self.private_key_path, "private_key_path")?;
        let public_pem = read(&self.public_key_path, "public_key_path")?;

        SigningKey::from_pem(&self.kid, algorithm, &private_pem, &public_pem)
            .map_err(ConfigError::from)
    }
}

/// Revocation ledger access settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Upper bound for a single storage call.
    #[serde(with = "humantime_serde")]
    pub storage_timeout: Duration,

    /// Total attempts per storage operation.
    pub max_retry_attempts: u32,

    /// Initial retry delay; doubles on each retry.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,

    /// Cap for the retry delay.
    #[serde(with = "humantime_serde")]
    pub max_retry_backoff: Duration,

    /// Answer of advisory lookups when storage is unreachable.
    pub advisory_lookup_failure: LookupFailureMode,

    /// Interval between revocation sweeps.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// PostgreSQL connection string for the persistent ledger.
    pub database_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let policy = GuardPolicy::default();
        Self {
            storage_timeout: policy.storage_timeout,
            max_retry_attempts: policy.max_retry_attempts,
            retry_backoff: policy.retry_backoff,
            max_retry_backoff: policy.max_retry_backoff,
            advisory_lookup_failure: policy.advisory_lookup_failure,
            sweep_interval: Duration::from_secs(600),
            database_url: None,
        }
    }
}

impl LedgerConfig {
    /// Timeout and retry policy for a [`crate::revocation::LedgerGuard`].
    #[must_use]
    pub fn guard_policy(&self) -> GuardPolicy {
        GuardPolicy {
            storage_timeout: self.storage_timeout,
            max_retry_attempts: self.max_retry_attempts,
            retry_backoff: self.retry_backoff,
            max_retry_backoff: self.max_retry_backoff,
            advisory_lookup_failure: self.advisory_lookup_failure,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// An HMAC secret is too short.
    #[error("Weak signing key '{kid}': {length} bytes, at least {minimum} required")]
    WeakKey {
        /// Key ID.
        kid: String,
        /// Secret length in bytes.
        length: usize,
        /// Required minimum.
        minimum: usize,
    },

    /// The configuration sources could not be read or parsed.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl From<AuthError> for ConfigError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::WeakKey {
                kid,
                length,
                minimum,
            } => Self::WeakKey {
                kid,
                length,
                minimum,
            },
            other => Self::InvalidValue(other.to_string()),
        }
    }
}

impl From<ConfigError> for AuthError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::WeakKey {
                kid,
                length,
                minimum,
            } => AuthError::weak_key(kid, length, minimum),
            other => AuthError::configuration(other.to_string()),
        }
    }
}

impl AuthConfig {
    /// Loads configuration from an optional TOML file and the environment.
    ///
    /// Without `path`, `tokengate.toml` in the working directory is used if
    /// present. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a source cannot be parsed, or the
    /// validation error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder();
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::Load(format!(
                        "config file {} not found",
                        p.display()
                    )));
                }
                builder = builder.add_source(File::from(p.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // e.g. TOKENGATE__LEDGER__STORAGE_TIMEOUT=5s
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );

        let merged: AuthConfig = builder
            .build()
            .and_then(|cfg| cfg.try_deserialize::<AuthConfig>())
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        merged.validate()?;
        Ok(merged)
    }

    /// Validates the configuration.
    ///
    /// PEM files are not read here; see [`AuthConfig::key_ring`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if:
    /// - issuer or audience is empty
    /// - `token_ttl` is zero, or expiry would be out of range
    /// - no signing keys are listed, or two share a `kid`
    /// - an algorithm is unknown
    /// - an HMAC secret is missing or shorter than 32 bytes
    /// - `ledger.max_retry_attempts` or `ledger.storage_timeout` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }
        if self.audience.is_empty() {
            return Err(ConfigError::InvalidValue(
                "audience cannot be empty".to_string(),
            ));
        }
        if self.token_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "token_ttl must be > 0".to_string(),
            ));
        }
        let horizon = self.ttl().checked_add(self.leeway_duration());
        if horizon
            .and_then(|h| time::OffsetDateTime::now_utc().checked_add(h))
            .is_none()
        {
            return Err(ConfigError::InvalidValue(
                "token_ttl plus leeway puts expiry out of range".to_string(),
            ));
        }

        if self.signing.keys.is_empty() {
            return Err(ConfigError::Missing("signing.keys".to_string()));
        }
        for (i, key) in self.signing.keys.iter().enumerate() {
            if key.kid.is_empty() {
                return Err(ConfigError::InvalidValue(format!(
                    "signing.keys[{i}].kid cannot be empty"
                )));
            }
            if self.signing.keys[..i].iter().any(|k| k.kid == key.kid) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate signing key id '{}'",
                    key.kid
                )));
            }
            if key.parsed_algorithm()?.is_hmac() {
                let length = key.secret_bytes()?.len();
                if length < MIN_HMAC_SECRET_LEN {
                    return Err(ConfigError::WeakKey {
                        kid: key.kid.clone(),
                        length,
                        minimum: MIN_HMAC_SECRET_LEN,
                    });
                }
            }
        }

        if self.ledger.max_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "ledger.max_retry_attempts must be > 0".to_string(),
            ));
        }
        if self.ledger.storage_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "ledger.storage_timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builds the key ring from `signing.keys`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any key cannot be built.
    pub fn key_ring(&self) -> Result<KeyRing, ConfigError> {
        let keys = self
            .signing
            .keys
            .iter()
            .map(SigningKeyConfig::to_signing_key)
            .collect::<Result<Vec<_>, _>>()?;
        KeyRing::new(keys).map_err(ConfigError::from)
    }

    /// Token lifetime as a signed duration.
    #[must_use]
    pub fn ttl(&self) -> time::Duration {
        to_time_duration(self.token_ttl)
    }

    /// Leeway as a signed duration.
    #[must_use]
    pub fn leeway_duration(&self) -> time::Duration {
        to_time_duration(self.leeway)
    }

    /// How long revocation entries must be kept: lifetime plus leeway.
    #[must_use]
    pub fn revocation_retention(&self) -> time::Duration {
        self.ttl().saturating_add(self.leeway_duration())
    }

    /// Validator settings derived from this configuration.
    #[must_use]
    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            enforce_issuer: self.enforce_issuer,
            enforce_audience: self.enforce_audience,
            leeway: self.leeway_duration(),
        }
    }
}

fn to_time_duration(d: Duration) -> time::Duration {
    time::Duration::try_from(d).unwrap_or(time::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SECRET_B64: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY";

    fn valid() -> AuthConfig {
        AuthConfig {
            signing: SigningConfig {
                keys: vec![SigningKeyConfig::hmac_base64("k1", SECRET_B64)],
            },
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.token_ttl, Duration::from_secs(86400));
        assert!(config.enforce_issuer);
        assert!(config.enforce_audience);
        assert_eq!(config.leeway, Duration::ZERO);
        assert_eq!(config.ledger.max_retry_attempts, 3);
        assert_eq!(
            config.ledger.advisory_lookup_failure,
            LookupFailureMode::FailClosed
        );
        // No key is shipped by default.
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_valid_config_builds_key_ring() {
        let config = valid();
        config.validate().unwrap();
        let ring = config.key_ring().unwrap();
        assert_eq!(ring.signing_key().kid(), "k1");
        assert_eq!(config.revocation_retention(), time::Duration::days(1));
    }

    #[test]
    fn test_weak_secret_rejected() {
        let mut config = valid();
        config.signing.keys[0] = SigningKeyConfig {
            secret: Some("veryverysecret.....".to_string()),
            secret_encoding: SecretEncoding::Utf8,
            ..config.signing.keys[0].clone()
        };

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::WeakKey {
                length: 19,
                minimum: 32,
                ..
            }
        ));
        assert!(matches!(AuthError::from(err), AuthError::WeakKey { .. }));
        assert!(matches!(
            config.key_ring(),
            Err(ConfigError::WeakKey { .. })
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = valid();
        config.issuer = String::new();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.token_ttl = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.signing.keys[0].algorithm = "none".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        let duplicate = config.signing.keys[0].clone();
        config.signing.keys.push(duplicate);
        assert!(config.validate().is_err());

        let mut config = valid();
        config.ledger.max_retry_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.ledger.storage_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_ttl_rejected() {
        let mut config = valid();
        config.token_ttl = Duration::from_secs(10_000 * 365 * 86_400);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));

        config.token_ttl = Duration::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));

        // A year is fine.
        config.token_ttl = Duration::from_secs(365 * 86_400);
        config.validate().unwrap();
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", valid().signing.keys[0]);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(SECRET_B64));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokengate.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
issuer = "https://auth.example.com/"
audience = "https://api.example.com/"
token_ttl = "1h"
leeway = "30s"

[[signing.keys]]
kid = "old"
secret = "0123456789abcdef0123456789abcdef"

[[signing.keys]]
kid = "new"
algorithm = "HS512"
secret = "{SECRET_B64}"
secret_encoding = "base64"

[ledger]
storage_timeout = "500ms"
advisory_lookup_failure = "fail_open"
"#
        )
        .unwrap();

        let config = AuthConfig::load(Some(&path)).unwrap();
        assert_eq!(config.issuer, "https://auth.example.com/");
        assert_eq!(config.token_ttl, Duration::from_secs(3600));
        assert_eq!(config.leeway, Duration::from_secs(30));
        assert_eq!(config.ledger.storage_timeout, Duration::from_millis(500));
        assert_eq!(
            config.ledger.advisory_lookup_failure,
            LookupFailureMode::FailOpen
        );

        let ring = config.key_ring().unwrap();
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.signing_key().kid(), "new");
        assert_eq!(ring.signing_key().algorithm(), SigningAlgorithm::HS512);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = AuthConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
