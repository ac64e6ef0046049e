//! Authentication key derivation.
//!
//! A key identifies "the same grant": the same principal, client, requested
//! scope and redirect URI. The store keeps at most one live access token per
//! key.

use crate::AuthenticationContext;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

/// Deterministic fingerprint of an [`AuthenticationContext`] (lowercase hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthenticationKey(String);

impl AuthenticationKey {
    /// Derive the key with the [`DefaultKeyGenerator`].
    #[must_use]
    pub fn derive(context: &AuthenticationContext) -> Self {
        DefaultKeyGenerator.extract_key(context)
    }

    /// Wrap an already-computed fingerprint (e.g. read back from storage).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthenticationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes [`AuthenticationKey`]s. Must be pure and deterministic.
pub trait KeyGenerator: Send + Sync {
    fn extract_key(&self, context: &AuthenticationContext) -> AuthenticationKey;
}

/// Hashes principal, client id, sorted scope and redirect URI.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyGenerator;

#[derive(Serialize)]
struct KeyMaterial<'a> {
    username: Option<&'a str>,
    client_id: &'a str,
    scope: &'a BTreeSet<String>,
    redirect_uri: Option<&'a str>,
}

impl KeyGenerator for DefaultKeyGenerator {
    fn extract_key(&self, context: &AuthenticationContext) -> AuthenticationKey {
        let material = KeyMaterial {
            username: context.principal_name(),
            client_id: context.client_id(),
            scope: &context.request.scope,
            redirect_uri: context.request.redirect_uri.as_deref(),
        };
        // Serializing borrowed strings and a string set cannot fail.
        let canonical = serde_json::to_vec(&material).unwrap_or_default();
        AuthenticationKey(format!("{:x}", Sha256::digest(&canonical)))
    }
}
