//! Authentication and authorization error types.
//!
//! This module defines all error types that can occur while issuing,
//! validating and revoking bearer tokens.
//!
//! Token failures are deliberately detailed internally (for logs and tests)
//! but collapse to a single generic message at the API boundary through
//! [`AuthError::public_message`].

use std::fmt;

/// Generic message returned to callers for every token failure.
pub const INVALID_TOKEN_MESSAGE: &str = "invalid or expired token";

/// Errors that can occur during authentication and authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The identity handed to the claim builder is incomplete.
    #[error("Invalid identity: {message}")]
    InvalidIdentity {
        /// Description of what is missing or malformed.
        message: String,
    },

    /// An HMAC signing secret is shorter than the enforced minimum.
    #[error("Weak signing key '{kid}': {length} bytes, at least {minimum} required")]
    WeakKey {
        /// Key ID of the rejected key.
        kid: String,
        /// Length of the provided secret in bytes.
        length: usize,
        /// Minimum accepted length in bytes.
        minimum: usize,
    },

    /// The token could not be parsed into header, payload and signature.
    #[error("Malformed token: {message}")]
    MalformedToken {
        /// Description of the structural problem.
        message: String,
    },

    /// No configured key verifies the token signature.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token's `exp` is at or before the current time.
    #[error("Token expired")]
    TokenExpired,

    /// The token's `iat` lies in the future.
    #[error("Token not yet valid")]
    TokenNotYetValid,

    /// The token was issued by an unexpected issuer.
    #[error("Issuer mismatch: {found}")]
    IssuerMismatch {
        /// Issuer found in the token.
        found: String,
    },

    /// The token is not addressed to this audience.
    #[error("Audience mismatch")]
    AudienceMismatch,

    /// The token's `jti` is recorded in the revocation ledger.
    #[error("Token revoked")]
    TokenRevoked,

    /// The revocation ledger could not be reached in time.
    #[error("Storage unavailable: {message}")]
    StorageUnavailable {
        /// Description of the storage failure.
        message: String,
    },

    /// The identity provider rejected the presented credentials.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The identity provider reports the account as locked out.
    #[error("Account locked")]
    AccountLocked,

    /// The identity provider reports the password as expired.
    #[error("Password expired")]
    PasswordExpired,

    /// The identity provider failed for a reason other than the credentials.
    #[error("Identity provider error: {message}")]
    IdentityProvider {
        /// Description of the provider failure.
        message: String,
    },

    /// The authenticated user lacks the role required for an operation.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why access is forbidden.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidIdentity` error.
    #[must_use]
    pub fn invalid_identity(message: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            message: message.into(),
        }
    }

    /// Creates a new `WeakKey` error.
    #[must_use]
    pub fn weak_key(kid: impl Into<String>, length: usize, minimum: usize) -> Self {
        Self::WeakKey {
            kid: kid.into(),
            length,
            minimum,
        }
    }

    /// Creates a new `MalformedToken` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedToken {
            message: message.into(),
        }
    }

    /// Creates a new `IssuerMismatch` error.
    #[must_use]
    pub fn issuer_mismatch(found: impl Into<String>) -> Self {
        Self::IssuerMismatch {
            found: found.into(),
        }
    }

    /// Creates a new `StorageUnavailable` error.
    #[must_use]
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `IdentityProvider` error.
    #[must_use]
    pub fn identity_provider(message: impl Into<String>) -> Self {
        Self::IdentityProvider {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this error rejects a presented token.
    ///
    /// These failures are permanent for that token and are never retried.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken { .. }
                | Self::InvalidSignature
                | Self::TokenExpired
                | Self::TokenNotYetValid
                | Self::IssuerMismatch { .. }
                | Self::AudienceMismatch
                | Self::TokenRevoked
        )
    }

    /// Returns `true` if retrying the same operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. } | Self::IdentityProvider { .. }
        )
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.is_token_error()
            || matches!(
                self,
                Self::InvalidIdentity { .. }
                    | Self::InvalidCredentials
                    | Self::AccountLocked
                    | Self::PasswordExpired
                    | Self::Forbidden { .. }
            )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::WeakKey { .. }
                | Self::StorageUnavailable { .. }
                | Self::IdentityProvider { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidIdentity { .. } => ErrorCategory::Identity,
            Self::WeakKey { .. } => ErrorCategory::Configuration,
            Self::MalformedToken { .. }
            | Self::InvalidSignature
            | Self::TokenExpired
            | Self::TokenNotYetValid
            | Self::IssuerMismatch { .. }
            | Self::AudienceMismatch
            | Self::TokenRevoked => ErrorCategory::Token,
            Self::StorageUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::InvalidCredentials | Self::AccountLocked | Self::PasswordExpired => {
                ErrorCategory::Authentication
            }
            Self::IdentityProvider { .. } => ErrorCategory::Infrastructure,
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the message that may be shown to the caller.
    ///
    /// Every token failure maps to the same text so a caller cannot learn
    /// which check rejected the token. Server-side failures are equally
    /// opaque.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            _ if self.is_token_error() => INVALID_TOKEN_MESSAGE,
            // The ledger could not confirm validity; reject like a bad token.
            Self::StorageUnavailable { .. } => INVALID_TOKEN_MESSAGE,
            Self::InvalidIdentity { .. } => "invalid identity",
            Self::InvalidCredentials => "invalid login attempt",
            Self::AccountLocked => "account is locked out, please try again later",
            Self::PasswordExpired => "password has expired, please reset it",
            Self::Forbidden { .. } => "access denied",
            _ => "internal server error",
        }
    }
}

/// Categories of authentication/authorization errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed identities handed to the claim builder.
    Identity,
    /// Credential verification errors.
    Authentication,
    /// Role checks.
    Authorization,
    /// Token validation errors (structure, signature, time, revocation).
    Token,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "identity"),
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::malformed("expected 3 segments");
        assert_eq!(err.to_string(), "Malformed token: expected 3 segments");

        let err = AuthError::TokenExpired;
        assert_eq!(err.to_string(), "Token expired");

        let err = AuthError::weak_key("k1", 10, 32);
        assert_eq!(
            err.to_string(),
            "Weak signing key 'k1': 10 bytes, at least 32 required"
        );
    }

    #[test]
    fn test_token_errors_collapse_to_generic_message() {
        let errors = [
            AuthError::malformed("x"),
            AuthError::InvalidSignature,
            AuthError::TokenExpired,
            AuthError::TokenNotYetValid,
            AuthError::issuer_mismatch("https://evil.example.com"),
            AuthError::AudienceMismatch,
            AuthError::TokenRevoked,
            AuthError::storage_unavailable("timeout"),
        ];

        for err in errors {
            assert_eq!(err.public_message(), INVALID_TOKEN_MESSAGE, "{err}");
        }
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::InvalidSignature;
        assert!(err.is_token_error());
        assert!(err.is_client_error());
        assert!(!err.is_retryable());

        let err = AuthError::storage_unavailable("db down");
        assert!(!err.is_token_error());
        assert!(err.is_retryable());
        assert!(err.is_server_error());

        let err = AuthError::forbidden("requires Admin");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(AuthError::TokenRevoked.category(), ErrorCategory::Token);
        assert_eq!(
            AuthError::InvalidCredentials.category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            AuthError::forbidden("x").category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            AuthError::storage_unavailable("x").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            AuthError::weak_key("k", 1, 32).category(),
            ErrorCategory::Configuration
        );
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Token.to_string(), "token");
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
