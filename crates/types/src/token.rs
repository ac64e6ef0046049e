//! Access and refresh token representations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in unix seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// A refresh token, optionally expiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl RefreshToken {
    /// Create a non-expiring refresh token.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    /// Create an expiring refresh token with an absolute expiry (unix seconds).
    pub fn expiring(value: impl Into<String>, expires_at: u64) -> Self {
        Self {
            value: value.into(),
            expires_at: Some(expires_at),
        }
    }
}

/// An OAuth2 access token as handed out to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub scope: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_information: BTreeMap<String, Value>,
}

impl AccessToken {
    /// Create a new non-expiring token with the given value and `bearer` type.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
            token_type: "bearer".to_string(),
            scope: BTreeSet::new(),
            refresh_token: None,
            additional_information: BTreeMap::new(),
        }
    }

    /// Set the expiry to `expires_in_secs` seconds from now.
    #[must_use]
    pub fn with_expiry(mut self, expires_in_secs: u64) -> Self {
        self.expires_at = Some(unix_now().saturating_add(expires_in_secs));
        self
    }

    /// Set an absolute expiry (unix seconds).
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh(mut self, refresh_token: RefreshToken) -> Self {
        self.refresh_token = Some(refresh_token);
        self
    }

    /// Replace the granted scope.
    #[must_use]
    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    /// Value of the linked refresh token, if any.
    #[must_use]
    pub fn refresh_token_value(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(|rt| rt.value.as_str())
    }

    /// Seconds until expiry relative to `now`, saturating at zero.
    #[must_use]
    pub fn expires_in(&self, now: u64) -> Option<u64> {
        self.expires_at.map(|at| at.saturating_sub(now))
    }
}

/// Which table a stored token lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => write!(f, "access"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

impl std::str::FromStr for TokenKind {
    type Err = crate::StoreError;

    /// Parse a token kind name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidToken`](crate::StoreError::InvalidToken)
    /// for any name other than `access` or `refresh`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" | "access_token" => Ok(Self::Access),
            "refresh" | "refresh_token" => Ok(Self::Refresh),
            other => Err(crate::StoreError::InvalidToken(format!(
                "unknown token kind: {other}"
            ))),
        }
    }
}
