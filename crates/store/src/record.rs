//! Stored records and the in-memory record table.

use grantstore_types::{
    AccessToken, AuthenticationContext, AuthenticationKey, RefreshToken, StoreError, TokenKind,
    traits::Result,
};
use std::collections::HashMap;

/// A token as persisted: the serialized token, its serialized authentication,
/// and the columns the indices and queries need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub value: String,
    pub kind: TokenKind,
    pub token_json: String,
    pub authentication_json: String,
    /// Set for access tokens only; refresh tokens are never looked up by key.
    pub authentication_key: Option<AuthenticationKey>,
    pub client_id: String,
    pub user_name: Option<String>,
    /// For an access token, the value of the refresh token it is linked to.
    pub linked: Option<String>,
    pub expires_at: Option<u64>,
}

fn require_value(kind: TokenKind, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidToken(format!("{kind} token value is empty")));
    }
    Ok(())
}

impl StoredRecord {
    /// Build the record for an access token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidToken`] for an empty value and
    /// [`StoreError::Serialization`] if the token or context cannot be encoded.
    pub fn access(
        token: &AccessToken,
        authentication: &AuthenticationContext,
        key: AuthenticationKey,
    ) -> Result<Self> {
        require_value(TokenKind::Access, &token.value)?;
        Ok(Self {
            value: token.value.clone(),
            kind: TokenKind::Access,
            token_json: serde_json::to_string(token)?,
            authentication_json: serde_json::to_string(authentication)?,
            authentication_key: Some(key),
            client_id: authentication.client_id().to_string(),
            user_name: authentication.principal.clone(),
            linked: token.refresh_token_value().map(str::to_string),
            expires_at: token.expires_at,
        })
    }

    /// Build the record for a refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidToken`] for an empty value and
    /// [`StoreError::Serialization`] if the token or context cannot be encoded.
    pub fn refresh(token: &RefreshToken, authentication: &AuthenticationContext) -> Result<Self> {
        require_value(TokenKind::Refresh, &token.value)?;
        Ok(Self {
            value: token.value.clone(),
            kind: TokenKind::Refresh,
            token_json: serde_json::to_string(token)?,
            authentication_json: serde_json::to_string(authentication)?,
            authentication_key: None,
            client_id: authentication.client_id().to_string(),
            user_name: authentication.principal.clone(),
            linked: None,
            expires_at: token.expires_at,
        })
    }

    /// Decode the stored access token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the stored JSON is not an access token.
    pub fn access_token(&self) -> Result<AccessToken> {
        Ok(serde_json::from_str(&self.token_json)?)
    }

    /// Decode the stored refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the stored JSON is not a refresh token.
    pub fn refresh_token(&self) -> Result<RefreshToken> {
        Ok(serde_json::from_str(&self.token_json)?)
    }

    /// Decode the stored authentication context.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the stored JSON is malformed.
    pub fn authentication(&self) -> Result<AuthenticationContext> {
        Ok(serde_json::from_str(&self.authentication_json)?)
    }
}

/// Value-keyed table of records of one kind.
#[derive(Debug, Default)]
pub struct RecordTable {
    rows: HashMap<String, StoredRecord>,
}

impl RecordTable {
    /// Inserts or overwrites.
    pub fn put(&mut self, record: StoredRecord) {
        self.rows.insert(record.value.clone(), record);
    }

    #[must_use]
    pub fn get(&self, value: &str) -> Option<&StoredRecord> {
        self.rows.get(value)
    }

    /// Idempotent; returns the removed record, if any.
    pub fn delete(&mut self, value: &str) -> Option<StoredRecord> {
        self.rows.remove(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredRecord> {
        self.rows.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}
