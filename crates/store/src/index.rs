//! Secondary indices: authentication key and refresh link to access token value.
//!
//! These are pure index mutations. They never touch a [`RecordTable`](crate::record::RecordTable);
//! the facade pairs both in one batch.

use grantstore_types::AuthenticationKey;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SecondaryIndex {
    auth_key: HashMap<AuthenticationKey, String>,
    refresh_link: HashMap<String, String>,
}

impl SecondaryIndex {
    // ── authentication key → access token ─────────────────────────────────

    pub fn set_auth_key_mapping(&mut self, key: AuthenticationKey, access_value: String) {
        self.auth_key.insert(key, access_value);
    }

    #[must_use]
    pub fn get_access_token_by_auth_key(&self, key: &AuthenticationKey) -> Option<&str> {
        self.auth_key.get(key).map(String::as_str)
    }

    /// Clears the mapping only if it still points at `access_value`.
    ///
    /// Returns whether an entry was removed.
    pub fn clear_auth_key_mapping(&mut self, key: &AuthenticationKey, access_value: &str) -> bool {
        if self.auth_key.get(key).is_some_and(|v| v == access_value) {
            self.auth_key.remove(key);
            return true;
        }
        false
    }

    // ── refresh token → access token ──────────────────────────────────────

    pub fn set_refresh_link(&mut self, refresh_value: String, access_value: String) {
        self.refresh_link.insert(refresh_value, access_value);
    }

    #[must_use]
    pub fn get_access_token_by_refresh(&self, refresh_value: &str) -> Option<&str> {
        self.refresh_link.get(refresh_value).map(String::as_str)
    }

    /// Clears the link. With `only_if` set, the link is kept unless it points
    /// at that access token value.
    pub fn clear_refresh_link(&mut self, refresh_value: &str, only_if: Option<&str>) -> bool {
        let matches = match (self.refresh_link.get(refresh_value), only_if) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(current), Some(expected)) => current == expected,
        };
        if matches {
            self.refresh_link.remove(refresh_value);
        }
        matches
    }

    #[must_use]
    pub fn auth_key_len(&self) -> usize {
        self.auth_key.len()
    }

    #[must_use]
    pub fn refresh_link_len(&self) -> usize {
        self.refresh_link.len()
    }

    pub fn clear(&mut self) {
        self.auth_key.clear();
        self.refresh_link.clear();
    }
}
