//! The token store contract shared across grantstore crates.
//!
//! Higher layers depend only on `grantstore-types`, never on a concrete
//! backend.

use crate::{AccessToken, AuthenticationContext, RefreshToken};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, crate::StoreError>;

/// Record and index counts, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub access_tokens: u64,
    pub refresh_tokens: u64,
    pub auth_key_entries: u64,
    pub refresh_links: u64,
}

/// What a purge pass evicted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    pub access_tokens: u64,
    pub refresh_tokens: u64,
}

impl PurgeReport {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.access_tokens + self.refresh_tokens
    }
}

/// Persistence for OAuth2 tokens and the authentication they were issued under.
///
/// Invariants every implementation upholds:
///
/// - at most one live access token per [`AuthenticationKey`](crate::AuthenticationKey);
///   storing another one for the same key supersedes the old token,
/// - expired tokens are absent from every read,
/// - removals are idempotent.
#[async_trait]
pub trait TokenStore: Send + Sync {
    // ── Access tokens ─────────────────────────────────────────────────────

    /// Store an access token together with the authentication it was issued for.
    ///
    /// A different token previously stored for the same authentication key is
    /// removed in the same atomic step.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidToken`](crate::StoreError::InvalidToken) for an
    /// empty token value, or a storage error if the write could not be committed.
    async fn store_access_token(
        &self,
        token: &AccessToken,
        authentication: &AuthenticationContext,
    ) -> Result<()>;

    /// Read a live access token by value.
    async fn read_access_token(&self, value: &str) -> Result<Option<AccessToken>>;

    /// Read the authentication stored for an access token.
    async fn read_authentication(
        &self,
        token: &AccessToken,
    ) -> Result<Option<AuthenticationContext>> {
        self.read_authentication_by_value(&token.value).await
    }

    /// Read the authentication stored under an access token value.
    async fn read_authentication_by_value(
        &self,
        value: &str,
    ) -> Result<Option<AuthenticationContext>>;

    /// Remove an access token and the index entries pointing at it.
    async fn remove_access_token(&self, value: &str) -> Result<()>;

    /// The live access token stored against the authentication's key, if any.
    async fn get_access_token(
        &self,
        authentication: &AuthenticationContext,
    ) -> Result<Option<AccessToken>>;

    // ── Refresh tokens ────────────────────────────────────────────────────

    /// Store a refresh token together with its authentication.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidToken`](crate::StoreError::InvalidToken) for an
    /// empty token value, or a storage error if the write could not be committed.
    async fn store_refresh_token(
        &self,
        token: &RefreshToken,
        authentication: &AuthenticationContext,
    ) -> Result<()>;

    /// Read a live refresh token by value.
    async fn read_refresh_token(&self, value: &str) -> Result<Option<RefreshToken>>;

    /// Read the authentication stored for a refresh token.
    async fn read_authentication_for_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<Option<AuthenticationContext>>;

    /// Remove a refresh token. Does not touch the access token it is linked to.
    async fn remove_refresh_token(&self, value: &str) -> Result<()>;

    /// Remove the access token linked to a refresh token, so a refresh token
    /// cannot be used to mint an unlimited number of access tokens.
    async fn remove_access_token_using_refresh_token(&self, refresh_value: &str) -> Result<()>;

    // ── Queries and maintenance ───────────────────────────────────────────

    /// All live access tokens issued to a client.
    async fn find_tokens_by_client_id(&self, client_id: &str) -> Result<Vec<AccessToken>>;

    /// All live access tokens issued to a client on behalf of a user.
    async fn find_tokens_by_client_id_and_user_name(
        &self,
        client_id: &str,
        user_name: &str,
    ) -> Result<Vec<AccessToken>>;

    /// Evict every expired record and the index entries pointing at them.
    async fn purge_expired(&self) -> Result<PurgeReport>;

    /// Record and index counts.
    async fn stats(&self) -> Result<StoreStats>;

    /// Remove every record and index entry.
    async fn clear(&self) -> Result<()>;
}
