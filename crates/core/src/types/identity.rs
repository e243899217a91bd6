//! Authenticated identity and bearer credential.

use std::collections::BTreeSet;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// The signed-in user as the console knows it.
///
/// Persisted as JSON, so field names follow the console's camelCase layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable identifier (email when available, otherwise the username).
    pub id: String,
    /// Email address, or the username for accounts without one.
    pub email: String,
    /// Name shown in the console header.
    pub display_name: String,
    /// Profile picture from the identity provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Backend role names granted to this user.
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Identity {
    /// Whether the identity carries the given role name.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Opaque bearer token authorizing API calls.
///
/// `Debug` never prints the token.
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// The raw token, for the `Authorization` header and persistence only.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

impl From<SecretString> for Credential {
    fn from(secret: SecretString) -> Self {
        Self(secret)
    }
}

/// An identity together with the credential it was issued.
///
/// The session store only ever holds identities through this type, so an
/// identity without a credential (or the reverse) cannot be represented.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub identity: Identity,
    pub credential: Credential,
}

impl AuthenticatedSession {
    #[must_use]
    pub const fn new(identity: Identity, credential: Credential) -> Self {
        Self {
            identity,
            credential,
        }
    }
}
