//! Fixed-window request limiting keyed by client identifier.
//!
//! A window opens on the first request from an identifier and closes
//! `window` later; requests inside it are counted in place, so the window's
//! deadline never moves until a new window is opened.

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::{sweeper::Sweep, DEFAULT_STORE_CAPACITY};
use crate::store::{check_duration, deadline_after, Clock, ConfigError, ExpiringStore};

const DEFAULT_MAX_REQUESTS: u32 = 5;
const DEFAULT_WINDOW_SECONDS: i64 = 15 * 60;

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    max_requests: u32,
    window: TimeDelta,
    capacity: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: TimeDelta::seconds(DEFAULT_WINDOW_SECONDS),
            capacity: DEFAULT_STORE_CAPACITY,
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: TimeDelta) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    #[must_use]
    pub fn window(&self) -> TimeDelta {
        self.window
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            return Err(ConfigError::NotPositive("max requests"));
        }
        if self.window <= TimeDelta::zero() {
            return Err(ConfigError::NotPositive("rate limit window"));
        }
        check_duration("rate limit window", self.window)
    }
}

/// Outcome of a single [`RateLimiter::check`] call.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub window_end: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug)]
struct Window {
    count: u32,
    window_end: DateTime<Utc>,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    windows: Mutex<ExpiringStore<String, Window>>,
}

impl RateLimiter {
    /// # Errors
    /// Returns `ConfigError` if the limit, window or capacity is not positive,
    /// or the window is longer than the store accepts.
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        let windows = ExpiringStore::new(config.capacity)?.with_eviction(
            |identifier: &String, _: &Window| {
                debug!(identifier = %identifier, "rate limit window evicted");
            },
        );

        Ok(Self {
            config,
            clock,
            windows: Mutex::new(windows),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a request from `identifier` against its current window.
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let max = self.config.max_requests;
        let mut windows = self.windows.lock();

        match windows.get(identifier).copied() {
            Some(window) if now <= window.window_end => {
                if window.count >= max {
                    debug!(identifier, "rate limit exceeded");
                    return RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        window_end: window.window_end,
                    };
                }

                let count = window.count + 1;
                if let Some(current) = windows.touch(identifier) {
                    current.count = count;
                }

                RateLimitDecision {
                    allowed: true,
                    remaining: max.saturating_sub(count),
                    window_end: window.window_end,
                }
            }
            _ => {
                let window_end = deadline_after(now, self.config.window);
                windows.renew(
                    identifier.to_string(),
                    Window {
                        count: 1,
                        window_end,
                    },
                    window_end,
                );

                RateLimitDecision {
                    allowed: true,
                    remaining: max - 1,
                    window_end,
                }
            }
        }
    }

    /// Forget the window of `identifier`.
    pub fn clear(&self, identifier: &str) {
        self.windows.lock().remove(identifier);
    }

    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.windows.lock().purge_expired(now)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.lock().is_empty()
    }
}

impl Sweep for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn purge_expired(&self) -> usize {
        Self::purge_expired(self)
    }
}
