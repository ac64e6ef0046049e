//! Background eviction of expired tokens.
//!
//! Lazy eviction on read already keeps every read correct; the sweeper only
//! bounds how long dead records occupy storage.

use grantstore_types::TokenStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Periodically calls [`TokenStore::purge_expired`].
pub struct Sweeper {
    store: Arc<dyn TokenStore>,
    interval: Duration,
}

impl Sweeper {
    /// A zero `interval` is raised to one second.
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_secs(1));
        Self { store, interval }
    }

    /// Run on a tokio task until `cancel` fires.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Sweep every interval until `cancel` fires. The first sweep happens one
    /// interval after start.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.store.purge_expired().await {
                        Ok(report) => debug!(evicted = report.total(), "sweep finished"),
                        Err(e) => warn!(error = %e, "sweep failed"),
                    }
                }
            }
        }
    }
}
