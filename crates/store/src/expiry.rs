//! Expiration policy and the clock it reads.

use crate::record::StoredRecord;
use grantstore_types::unix_now;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the current time in unix seconds.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        unix_now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Decides whether a stored record is still valid at read time.
#[derive(Debug, Clone)]
pub struct ExpirationPolicy {
    clock: Arc<dyn Clock>,
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl ExpirationPolicy {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// A record without an expiry never expires; otherwise it is expired from
    /// its expiry instant onwards.
    #[must_use]
    pub fn is_expired(record: &StoredRecord, now: u64) -> bool {
        record.expires_at.is_some_and(|at| at <= now)
    }

    /// [`Self::is_expired`] against the policy's clock.
    #[must_use]
    pub fn is_expired_now(&self, record: &StoredRecord) -> bool {
        Self::is_expired(record, self.now())
    }
}
