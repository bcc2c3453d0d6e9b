//! Claim construction.
//!
//! A verified [`Identity`] becomes an ordered [`ClaimSet`]: `sub`, `email`,
//! an optional `name`, then one `role` claim per role in ascending order.
//! The ordering makes tokens byte-reproducible for identical inputs.
//!
//! [`TokenClaims`] is the JSON payload actually carried inside a token: the
//! claim set plus the registered timing and addressing claims.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::AuthResult;
use crate::error::AuthError;
use crate::identity::Identity;

/// The kinds of identity claims a token carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClaimType {
    /// User identifier (`sub`).
    Subject,
    /// Email address (`email`).
    Email,
    /// Display name (`name`).
    Name,
    /// Role membership (`role`), repeated once per role.
    Role,
}

impl ClaimType {
    /// Returns the JWT claim name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subject => "sub",
            Self::Email => "email",
            Self::Name => "name",
            Self::Role => "role",
        }
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single typed claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// Claim type.
    pub claim_type: ClaimType,
    /// Claim value.
    pub value: String,
}

impl Claim {
    /// Creates a claim.
    #[must_use]
    pub fn new(claim_type: ClaimType, value: impl Into<String>) -> Self {
        Self {
            claim_type,
            value: value.into(),
        }
    }
}

/// Ordered identity claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSet {
    claims: Vec<Claim>,
}

impl ClaimSet {
    /// Builds the claim set for a verified identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidIdentity`] when the user id or email is
    /// blank, or when a role name is blank.
    pub fn from_identity(identity: &Identity) -> AuthResult<Self> {
        if identity.user_id().trim().is_empty() {
            return Err(AuthError::invalid_identity("user_id is required"));
        }
        if identity.email().trim().is_empty() {
            return Err(AuthError::invalid_identity("email is required"));
        }
        if identity.roles().iter().any(|r| r.trim().is_empty()) {
            return Err(AuthError::invalid_identity("role names cannot be blank"));
        }

        let mut claims = Vec::with_capacity(3 + identity.roles().len());
        claims.push(Claim::new(ClaimType::Subject, identity.user_id()));
        claims.push(Claim::new(ClaimType::Email, identity.email()));
        if !identity.display_name().is_empty() {
            claims.push(Claim::new(ClaimType::Name, identity.display_name()));
        }
        // BTreeSet iteration is already sorted by role name.
        claims.extend(
            identity
                .roles()
                .iter()
                .map(|role| Claim::new(ClaimType::Role, role.as_str())),
        );

        Ok(Self { claims })
    }

    /// All claims in order.
    #[must_use]
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    fn first(&self, claim_type: ClaimType) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// The `sub` claim.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.first(ClaimType::Subject).unwrap_or_default()
    }

    /// The `email` claim.
    #[must_use]
    pub fn email(&self) -> &str {
        self.first(ClaimType::Email).unwrap_or_default()
    }

    /// The `name` claim, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.first(ClaimType::Name)
    }

    /// All `role` claim values in order.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.claims
            .iter()
            .filter(|c| c.claim_type == ClaimType::Role)
            .map(|c| c.value.as_str())
    }

    /// Reconstructs the identity these claims describe.
    #[must_use]
    pub fn to_identity(&self) -> Identity {
        Identity::new(self.subject(), self.email(), self.roles())
            .with_display_name(self.name().unwrap_or_default())
    }
}

/// Builds the ordered claims for `identity`.
///
/// # Errors
///
/// See [`ClaimSet::from_identity`].
pub fn build_claims(identity: &Identity) -> AuthResult<ClaimSet> {
    ClaimSet::from_identity(identity)
}

/// JSON payload of an issued token.
///
/// Field order is the serialization order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    /// Issuer; empty when the token carries none.
    #[serde(default)]
    pub iss: String,

    /// Audience; a single audience is serialized as a plain string.
    #[serde(
        default,
        serialize_with = "serialize_one_or_many",
        deserialize_with = "deserialize_one_or_many"
    )]
    pub aud: Vec<String>,

    /// Subject (user id).
    pub sub: String,

    /// Email address.
    pub email: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Role names, sorted.
    #[serde(default, deserialize_with = "deserialize_one_or_many")]
    pub role: Vec<String>,

    /// Unique token identifier, used for revocation.
    pub jti: String,

    /// Issued at (Unix seconds).
    pub iat: i64,

    /// Not before (Unix seconds); equals `iat` for tokens issued here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Expiration time (Unix seconds).
    pub exp: i64,
}

impl TokenClaims {
    /// Rebuilds the ordered claim set from the payload.
    #[must_use]
    pub fn claim_set(&self) -> ClaimSet {
        let mut claims = vec![
            Claim::new(ClaimType::Subject, self.sub.as_str()),
            Claim::new(ClaimType::Email, self.email.as_str()),
        ];
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            claims.push(Claim::new(ClaimType::Name, name));
        }
        let mut roles = self.role.clone();
        roles.sort();
        roles.dedup();
        claims.extend(roles.into_iter().map(|r| Claim::new(ClaimType::Role, r)));
        ClaimSet { claims }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn deserialize_one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

fn serialize_one_or_many<S>(values: &[String], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match values {
        [single] => serializer.serialize_str(single),
        many => many.serialize(serializer),
    }
}
