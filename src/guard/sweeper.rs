//! Periodic cleanup of expired entries across every store.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// A store that can drop its expired entries on demand.
pub trait Sweep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Remove every entry whose deadline has passed, returning how many.
    fn purge_expired(&self) -> usize;
}

#[derive(Default, Clone)]
pub struct Sweeper {
    targets: Vec<Arc<dyn Sweep>>,
}

impl Sweeper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_target(mut self, target: Arc<dyn Sweep>) -> Self {
        self.targets.push(target);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Sweep every target once and return the total number of purged entries.
    pub fn run_once(&self) -> usize {
        self.targets
            .iter()
            .map(|target| {
                let purged = target.purge_expired();
                if purged > 0 {
                    debug!(store = target.name(), purged, "expired entries purged");
                }
                purged
            })
            .sum()
    }

    /// Run [`Sweeper::run_once`] every `period` on the tokio runtime.
    ///
    /// The first sweep happens one full period after spawning.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        info!(
            period_secs = period.as_secs(),
            stores = self.targets.len(),
            "starting expiry sweeper"
        );

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.run_once();
            }
        })
    }
}
