//! Verified user identities and the identity provider boundary.
//!
//! Credential storage, password hashing and lockout policy live behind the
//! [`IdentityProvider`] trait. The token core only ever sees the verified
//! [`Identity`] it returns.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// A verified user identity.
///
/// Roles are held in a sorted set, so iteration order is stable and
/// duplicates collapse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    user_id: String,
    email: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    roles: BTreeSet<String>,
}

impl Identity {
    /// Creates an identity with the given roles.
    pub fn new<I, R>(user_id: impl Into<String>, email: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            display_name: String::new(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Returns a copy of this identity carrying `roles` instead of its own.
    #[must_use]
    pub fn with_roles(&self, roles: BTreeSet<String>) -> Self {
        Self {
            roles,
            ..self.clone()
        }
    }

    /// Stable user identifier (the token `sub`).
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Email address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Human-readable name, empty when unknown.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Role names in ascending order.
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Returns `true` if the identity holds `role` (case-sensitive).
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Failure reported by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    /// Unknown user or wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Too many failed attempts; the account is temporarily locked.
    #[error("account locked")]
    AccountLocked,

    /// The password must be reset before logging in.
    #[error("password expired")]
    PasswordExpired,

    /// The provider itself could not answer.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

impl From<AuthFailure> for AuthError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::InvalidCredentials => Self::InvalidCredentials,
            AuthFailure::AccountLocked => Self::AccountLocked,
            AuthFailure::PasswordExpired => Self::PasswordExpired,
            AuthFailure::Unavailable(message) => Self::identity_provider(message),
        }
    }
}

/// External service that verifies credentials and knows user roles.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verifies an email/password pair and returns the matching identity.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthFailure`] describing why the login was refused.
    async fn verify_credentials(&self, email: &str, password: &str)
    -> Result<Identity, AuthFailure>;

    /// Returns the current role set of a user.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthFailure`] if the user is unknown or the provider fails.
    async fn roles(&self, user_id: &str) -> Result<BTreeSet<String>, AuthFailure>;
}
