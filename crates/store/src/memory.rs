//! In-memory backend: two record tables and the secondary index behind one `Mutex`.

use crate::backend::{Batch, Mutation, RecordBackend};
use crate::expiry::ExpirationPolicy;
use crate::index::SecondaryIndex;
use crate::record::{RecordTable, StoredRecord};
use async_trait::async_trait;
use grantstore_types::{AuthenticationKey, StoreStats, TokenKind, traits::Result};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Tables {
    access: RecordTable,
    refresh: RecordTable,
    index: SecondaryIndex,
}

impl Tables {
    fn table(&self, kind: TokenKind) -> &RecordTable {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn table_mut(&mut self, kind: TokenKind) -> &mut RecordTable {
        match kind {
            TokenKind::Access => &mut self.access,
            TokenKind::Refresh => &mut self.refresh,
        }
    }

    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::PutRecord(record) => self.table_mut(record.kind).put(record),
            Mutation::DeleteRecord { kind, value } => {
                self.table_mut(kind).delete(&value);
            }
            Mutation::SetAuthKey { key, access_value } => {
                self.index.set_auth_key_mapping(key, access_value);
            }
            Mutation::ClearAuthKey { key, access_value } => {
                self.index.clear_auth_key_mapping(&key, &access_value);
            }
            Mutation::SetRefreshLink {
                refresh_value,
                access_value,
            } => self.index.set_refresh_link(refresh_value, access_value),
            Mutation::ClearRefreshLink {
                refresh_value,
                only_if,
            } => {
                self.index
                    .clear_refresh_link(&refresh_value, only_if.as_deref());
            }
            Mutation::Clear => {
                self.access.clear();
                self.refresh.clear();
                self.index.clear();
            }
        }
    }
}

/// A [`RecordBackend`] for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation completes under the guard, so a poisoned lock still
    // holds consistent tables.
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RecordBackend for MemoryBackend {
    async fn get(&self, kind: TokenKind, value: &str) -> Result<Option<StoredRecord>> {
        Ok(self.tables().table(kind).get(value).cloned())
    }

    async fn access_by_auth_key(&self, key: &AuthenticationKey) -> Result<Option<String>> {
        Ok(self
            .tables()
            .index
            .get_access_token_by_auth_key(key)
            .map(str::to_string))
    }

    async fn access_by_refresh(&self, refresh_value: &str) -> Result<Option<String>> {
        Ok(self
            .tables()
            .index
            .get_access_token_by_refresh(refresh_value)
            .map(str::to_string))
    }

    async fn find_access_by_link(&self, refresh_value: &str) -> Result<Vec<StoredRecord>> {
        let tables = self.tables();
        let mut found: Vec<StoredRecord> = tables
            .access
            .iter()
            .filter(|r| r.linked.as_deref() == Some(refresh_value))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.value.cmp(&b.value));
        Ok(found)
    }

    async fn find_access(
        &self,
        client_id: &str,
        user_name: Option<&str>,
    ) -> Result<Vec<StoredRecord>> {
        let tables = self.tables();
        let mut found: Vec<StoredRecord> = tables
            .access
            .iter()
            .filter(|r| r.client_id == client_id)
            .filter(|r| user_name.is_none_or(|u| r.user_name.as_deref() == Some(u)))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.value.cmp(&b.value));
        Ok(found)
    }

    async fn expired(&self, now: u64) -> Result<Vec<StoredRecord>> {
        let tables = self.tables();
        Ok(tables
            .access
            .iter()
            .chain(tables.refresh.iter())
            .filter(|r| ExpirationPolicy::is_expired(r, now))
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let tables = self.tables();
        Ok(StoreStats {
            access_tokens: tables.access.len() as u64,
            refresh_tokens: tables.refresh.len() as u64,
            auth_key_entries: tables.index.auth_key_len() as u64,
            refresh_links: tables.index.refresh_link_len() as u64,
        })
    }

    async fn apply(&self, batch: Batch) -> Result<()> {
        let mut tables = self.tables();
        for mutation in batch {
            tables.apply(mutation);
        }
        Ok(())
    }
}
