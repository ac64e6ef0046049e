//! The [`TokenStore`] implementation shared by every backend.
//!
//! All invariants live here: supersession per authentication key, refresh
//! cascades and lazy eviction of expired records. Backends only store.
//!
//! Mutual exclusion is a single `RwLock<()>` covering the record tables and
//! both indices. Reads hold the shared side for every lookup they chain
//! together; mutations hold the exclusive side from their first lookup until
//! their batch is committed, so no reader sees a half-applied supersession.

use crate::backend::{Batch, Mutation, RecordBackend};
use crate::expiry::{Clock, ExpirationPolicy};
use crate::record::StoredRecord;
use async_trait::async_trait;
use grantstore_types::{
    AccessToken, AuthenticationContext, AuthenticationKey, DefaultKeyGenerator, KeyGenerator,
    PurgeReport, RefreshToken, StoreStats, TokenKind, TokenStore, traits::Result,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A [`TokenStore`] over any [`RecordBackend`].
pub struct GrantTokenStore<B> {
    backend: B,
    policy: ExpirationPolicy,
    keys: Arc<dyn KeyGenerator>,
    lock: RwLock<()>,
}

impl<B: RecordBackend> GrantTokenStore<B> {
    /// Wraps a backend with the system clock and the default key generator.
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            policy: ExpirationPolicy::default(),
            keys: Arc::new(DefaultKeyGenerator),
            lock: RwLock::new(()),
        }
    }

    /// Replace the clock expiry is evaluated against.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.policy = ExpirationPolicy::new(clock);
        self
    }

    /// Replace the authentication key derivation.
    #[must_use]
    pub fn with_key_generator(mut self, keys: Arc<dyn KeyGenerator>) -> Self {
        self.keys = keys;
        self
    }

    /// The backend, for diagnostics.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The key this store derives for an authentication.
    pub fn authentication_key(&self, authentication: &AuthenticationContext) -> AuthenticationKey {
        self.keys.extract_key(authentication)
    }

    /// Look up a record; an expired one is evicted and reported as absent.
    async fn live_record(&self, kind: TokenKind, value: &str) -> Result<Option<StoredRecord>> {
        let record = {
            let _read = self.lock.read().await;
            self.backend.get(kind, value).await?
        };
        match record {
            Some(r) if self.policy.is_expired_now(&r) => {
                self.evict(kind, value).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Remove a record, re-checked under the write lock, if it is still expired.
    async fn evict(&self, kind: TokenKind, value: &str) -> Result<()> {
        let _write = self.lock.write().await;
        let Some(record) = self.backend.get(kind, value).await? else {
            return Ok(());
        };
        if !self.policy.is_expired_now(&record) {
            return Ok(());
        }
        let mut batch = Batch::default();
        match kind {
            TokenKind::Access => batch.remove_access(&record),
            TokenKind::Refresh => batch.remove_refresh(value),
        }
        self.backend.apply(batch).await?;
        debug!(%kind, token = value, "evicted expired token");
        Ok(())
    }

    fn live_access_tokens(&self, records: Vec<StoredRecord>) -> Result<Vec<AccessToken>> {
        let now = self.policy.now();
        records
            .into_iter()
            .filter(|r| !ExpirationPolicy::is_expired(r, now))
            .map(|r| r.access_token())
            .collect()
    }
}

#[async_trait]
impl<B: RecordBackend> TokenStore for GrantTokenStore<B> {
    // ── Access tokens ─────────────────────────────────────────────────────

    async fn store_access_token(
        &self,
        token: &AccessToken,
        authentication: &AuthenticationContext,
    ) -> Result<()> {
        let key = self.keys.extract_key(authentication);
        // Built before locking: a malformed token is rejected with nothing applied.
        let record = StoredRecord::access(token, authentication, key.clone())?;

        let _write = self.lock.write().await;
        let mut batch = Batch::default();

        if let Some(existing) = self.backend.get(TokenKind::Access, &token.value).await? {
            batch.remove_access(&existing);
        }

        if let Some(previous) = self.backend.access_by_auth_key(&key).await?
            && previous != token.value
        {
            match self.backend.get(TokenKind::Access, &previous).await? {
                Some(old) => batch.remove_access(&old),
                None => batch.push(Mutation::ClearAuthKey {
                    key: key.clone(),
                    access_value: previous.clone(),
                }),
            }
            info!(
                superseded = %previous,
                client_id = authentication.client_id(),
                "access token superseded for authentication key"
            );
        }

        batch.push(Mutation::PutRecord(record));
        batch.push(Mutation::SetAuthKey {
            key,
            access_value: token.value.clone(),
        });
        if let Some(refresh_value) = token.refresh_token_value() {
            batch.push(Mutation::SetRefreshLink {
                refresh_value: refresh_value.to_string(),
                access_value: token.value.clone(),
            });
        }

        self.backend.apply(batch).await?;
        debug!(client_id = authentication.client_id(), "stored access token");
        Ok(())
    }

    async fn read_access_token(&self, value: &str) -> Result<Option<AccessToken>> {
        self.live_record(TokenKind::Access, value)
            .await?
            .map(|r| r.access_token())
            .transpose()
    }

    async fn read_authentication_by_value(
        &self,
        value: &str,
    ) -> Result<Option<AuthenticationContext>> {
        self.live_record(TokenKind::Access, value)
            .await?
            .map(|r| r.authentication())
            .transpose()
    }

    async fn remove_access_token(&self, value: &str) -> Result<()> {
        let _write = self.lock.write().await;
        let Some(record) = self.backend.get(TokenKind::Access, value).await? else {
            return Ok(());
        };
        let mut batch = Batch::default();
        batch.remove_access(&record);
        self.backend.apply(batch).await?;
        debug!(token = value, "removed access token");
        Ok(())
    }

    async fn get_access_token(
        &self,
        authentication: &AuthenticationContext,
    ) -> Result<Option<AccessToken>> {
        let key = self.keys.extract_key(authentication);
        let (value, record) = {
            let _read = self.lock.read().await;
            let Some(value) = self.backend.access_by_auth_key(&key).await? else {
                return Ok(None);
            };
            let record = self.backend.get(TokenKind::Access, &value).await?;
            (value, record)
        };

        match record {
            None => {
                warn!(token = %value, "authentication key index points at a missing token");
                let _write = self.lock.write().await;
                if self.backend.get(TokenKind::Access, &value).await?.is_none() {
                    let mut batch = Batch::default();
                    batch.push(Mutation::ClearAuthKey {
                        key,
                        access_value: value,
                    });
                    self.backend.apply(batch).await?;
                }
                Ok(None)
            }
            Some(r) if self.policy.is_expired_now(&r) => {
                self.evict(TokenKind::Access, &value).await?;
                Ok(None)
            }
            Some(r) => Ok(Some(r.access_token()?)),
        }
    }

    // ── Refresh tokens ────────────────────────────────────────────────────

    async fn store_refresh_token(
        &self,
        token: &RefreshToken,
        authentication: &AuthenticationContext,
    ) -> Result<()> {
        let record = StoredRecord::refresh(token, authentication)?;
        let _write = self.lock.write().await;
        let mut batch = Batch::default();
        batch.push(Mutation::PutRecord(record));
        self.backend.apply(batch).await?;
        debug!(client_id = authentication.client_id(), "stored refresh token");
        Ok(())
    }

    async fn read_refresh_token(&self, value: &str) -> Result<Option<RefreshToken>> {
        self.live_record(TokenKind::Refresh, value)
            .await?
            .map(|r| r.refresh_token())
            .transpose()
    }

    async fn read_authentication_for_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<Option<AuthenticationContext>> {
        self.live_record(TokenKind::Refresh, &token.value)
            .await?
            .map(|r| r.authentication())
            .transpose()
    }

    async fn remove_refresh_token(&self, value: &str) -> Result<()> {
        let _write = self.lock.write().await;
        let mut batch = Batch::default();
        batch.remove_refresh(value);
        self.backend.apply(batch).await?;
        debug!(token = value, "removed refresh token");
        Ok(())
    }

    async fn remove_access_token_using_refresh_token(&self, refresh_value: &str) -> Result<()> {
        let _write = self.lock.write().await;
        // The link names the latest access token; older ones issued with the
        // same refresh token under another key are found by their record.
        let mut records = self.backend.find_access_by_link(refresh_value).await?;
        let linked = self.backend.access_by_refresh(refresh_value).await?;
        if let Some(access_value) = &linked
            && !records.iter().any(|r| &r.value == access_value)
            && let Some(record) = self.backend.get(TokenKind::Access, access_value).await?
        {
            records.push(record);
        }
        if linked.is_none() && records.is_empty() {
            return Ok(());
        }

        let mut batch = Batch::default();
        for record in &records {
            batch.remove_access(record);
        }
        batch.push(Mutation::ClearRefreshLink {
            refresh_value: refresh_value.to_string(),
            only_if: None,
        });
        self.backend.apply(batch).await?;
        debug!(
            refresh_token = refresh_value,
            removed = records.len(),
            "removed access tokens linked to refresh token"
        );
        Ok(())
    }

    // ── Queries and maintenance ───────────────────────────────────────────

    async fn find_tokens_by_client_id(&self, client_id: &str) -> Result<Vec<AccessToken>> {
        let records = {
            let _read = self.lock.read().await;
            self.backend.find_access(client_id, None).await?
        };
        self.live_access_tokens(records)
    }

    async fn find_tokens_by_client_id_and_user_name(
        &self,
        client_id: &str,
        user_name: &str,
    ) -> Result<Vec<AccessToken>> {
        let records = {
            let _read = self.lock.read().await;
            self.backend.find_access(client_id, Some(user_name)).await?
        };
        self.live_access_tokens(records)
    }

    async fn purge_expired(&self) -> Result<PurgeReport> {
        let _write = self.lock.write().await;
        let expired = self.backend.expired(self.policy.now()).await?;
        let mut report = PurgeReport::default();
        let mut batch = Batch::default();
        for record in &expired {
            match record.kind {
                TokenKind::Access => {
                    batch.remove_access(record);
                    report.access_tokens += 1;
                }
                TokenKind::Refresh => {
                    batch.remove_refresh(&record.value);
                    report.refresh_tokens += 1;
                }
            }
        }
        if !batch.is_empty() {
            self.backend.apply(batch).await?;
            info!(
                access_tokens = report.access_tokens,
                refresh_tokens = report.refresh_tokens,
                "purged expired tokens"
            );
        }
        Ok(report)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let _read = self.lock.read().await;
        self.backend.stats().await
    }

    async fn clear(&self) -> Result<()> {
        let _write = self.lock.write().await;
        let mut batch = Batch::default();
        batch.push(Mutation::Clear);
        self.backend.apply(batch).await?;
        info!("cleared token store");
        Ok(())
    }
}
