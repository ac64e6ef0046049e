//! The storage capability set the facade is written against.
//!
//! A backend answers single-key lookups and applies a [`Batch`] of record and
//! index mutations atomically: either every mutation lands or none does.

use crate::record::StoredRecord;
use async_trait::async_trait;
use grantstore_types::{AuthenticationKey, StoreStats, TokenKind, traits::Result};

/// One record or index mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert or overwrite a record in the table of its kind.
    PutRecord(StoredRecord),
    /// Delete a record; a no-op if absent.
    DeleteRecord { kind: TokenKind, value: String },
    SetAuthKey {
        key: AuthenticationKey,
        access_value: String,
    },
    /// Clear the key mapping if it still points at `access_value`.
    ClearAuthKey {
        key: AuthenticationKey,
        access_value: String,
    },
    SetRefreshLink {
        refresh_value: String,
        access_value: String,
    },
    /// Clear a refresh link; with `only_if` set, only when it points at that value.
    ClearRefreshLink {
        refresh_value: String,
        only_if: Option<String>,
    },
    /// Drop every record and index entry.
    Clear,
}

/// Mutations applied in order, as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    mutations: Vec<Mutation>,
}

impl Batch {
    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    /// Queue the full removal of an access record: the record itself, its
    /// key mapping and its refresh link, each only where it still points at
    /// this token.
    pub fn remove_access(&mut self, record: &StoredRecord) {
        self.push(Mutation::DeleteRecord {
            kind: TokenKind::Access,
            value: record.value.clone(),
        });
        if let Some(key) = &record.authentication_key {
            self.push(Mutation::ClearAuthKey {
                key: key.clone(),
                access_value: record.value.clone(),
            });
        }
        if let Some(refresh_value) = &record.linked {
            self.push(Mutation::ClearRefreshLink {
                refresh_value: refresh_value.clone(),
                only_if: Some(record.value.clone()),
            });
        }
    }

    pub fn remove_refresh(&mut self, value: &str) {
        self.push(Mutation::DeleteRecord {
            kind: TokenKind::Refresh,
            value: value.to_string(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mutations.len()
    }
}

impl IntoIterator for Batch {
    type Item = Mutation;
    type IntoIter = std::vec::IntoIter<Mutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.into_iter()
    }
}

/// Record store plus secondary indices behind one interface.
///
/// Implementations only store; the invariants (supersession, cascades,
/// expiry) live in [`GrantTokenStore`](crate::GrantTokenStore).
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// Fetch a record by kind and value, regardless of expiry.
    async fn get(&self, kind: TokenKind, value: &str) -> Result<Option<StoredRecord>>;

    /// The access token value the key currently maps to.
    async fn access_by_auth_key(&self, key: &AuthenticationKey) -> Result<Option<String>>;

    /// The access token value a refresh token is linked to.
    async fn access_by_refresh(&self, refresh_value: &str) -> Result<Option<String>>;

    /// Access records carrying `refresh_value` as their refresh token.
    async fn find_access_by_link(&self, refresh_value: &str) -> Result<Vec<StoredRecord>>;

    /// Access records for a client, optionally narrowed to one user.
    async fn find_access(
        &self,
        client_id: &str,
        user_name: Option<&str>,
    ) -> Result<Vec<StoredRecord>>;

    /// Every record whose expiry is at or before `now`.
    async fn expired(&self, now: u64) -> Result<Vec<StoredRecord>>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Apply every mutation in order, atomically.
    async fn apply(&self, batch: Batch) -> Result<()>;
}
