//! Token storage for OAuth2 grants.
//!
//! [`GrantTokenStore`] implements the [`TokenStore`](grantstore_types::TokenStore)
//! contract over a [`RecordBackend`]: an in-memory backend for tests and
//! ephemeral use, and a SQLite backend for production.

pub mod backend;
pub mod expiry;
pub mod facade;
pub mod index;
pub mod memory;
pub mod record;
pub mod sqlite;
pub mod sweeper;

pub use backend::{Batch, Mutation, RecordBackend};
pub use expiry::{Clock, ExpirationPolicy, ManualClock, SystemClock};
pub use facade::GrantTokenStore;
pub use memory::MemoryBackend;
pub use record::StoredRecord;
pub use sqlite::SqliteBackend;
pub use sweeper::Sweeper;

/// Token store kept entirely in memory.
pub type InMemoryTokenStore = GrantTokenStore<MemoryBackend>;

/// Token store persisted in `SQLite`.
pub type SqliteTokenStore = GrantTokenStore<SqliteBackend>;

impl GrantTokenStore<MemoryBackend> {
    /// Creates a new empty in-memory token store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(MemoryBackend::new())
    }
}

impl Default for GrantTokenStore<MemoryBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl GrantTokenStore<SqliteBackend> {
    /// Connects to a `SQLite` database and runs migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`sqlx::Error`] if the connection or table creation fails.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Ok(Self::with_backend(SqliteBackend::new(database_url).await?))
    }
}
