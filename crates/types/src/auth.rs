//! The authentication context a token was issued under.
//!
//! The store treats this as an opaque, serializable value. Only key
//! derivation ([`crate::key`]) and the client/user lookups read its fields.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The authorization request that led to a grant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub client_id: String,
    #[serde(default)]
    pub scope: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default)]
    pub approved: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl AuthorizationRequest {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    #[must_use]
    pub fn approved(mut self) -> Self {
        self.approved = true;
        self
    }
}

/// A principal plus the request it authorized.
///
/// `principal` is `None` for client-only grants (e.g. client credentials).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    pub request: AuthorizationRequest,
}

impl AuthenticationContext {
    /// Context for a user-delegated grant.
    pub fn new(principal: impl Into<String>, request: AuthorizationRequest) -> Self {
        Self {
            principal: Some(principal.into()),
            request,
        }
    }

    /// Context for a grant with no end user.
    #[must_use]
    pub fn client_only(request: AuthorizationRequest) -> Self {
        Self {
            principal: None,
            request,
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.request.client_id
    }

    #[must_use]
    pub fn principal_name(&self) -> Option<&str> {
        self.principal.as_deref()
    }
}
