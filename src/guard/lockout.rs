//! Consecutive failed-login tracking with a timed lockout.
//!
//! Each identifier accumulates failures until `max_attempts`, then stays
//! locked for `lockout` no matter how many more attempts arrive. A record is
//! dropped after `stale_after` without failures, when its lockout ends, or
//! when the login succeeds.

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::{sweeper::Sweep, DEFAULT_STORE_CAPACITY};
use crate::store::{check_duration, deadline_after, Clock, ConfigError, ExpiringStore};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT_SECONDS: i64 = 15 * 60;
const DEFAULT_STALE_AFTER_SECONDS: i64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct LockoutConfig {
    max_attempts: u32,
    lockout: TimeDelta,
    stale_after: TimeDelta,
    capacity: usize,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout: TimeDelta::seconds(DEFAULT_LOCKOUT_SECONDS),
            stale_after: TimeDelta::seconds(DEFAULT_STALE_AFTER_SECONDS),
            capacity: DEFAULT_STORE_CAPACITY,
        }
    }
}

impl LockoutConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_lockout(mut self, lockout: TimeDelta) -> Self {
        self.lockout = lockout;
        self
    }

    #[must_use]
    pub fn with_stale_after(mut self, stale_after: TimeDelta) -> Self {
        self.stale_after = stale_after;
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn lockout(&self) -> TimeDelta {
        self.lockout
    }

    #[must_use]
    pub fn stale_after(&self) -> TimeDelta {
        self.stale_after
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::NotPositive("max attempts"));
        }
        if self.lockout <= TimeDelta::zero() {
            return Err(ConfigError::NotPositive("lockout duration"));
        }
        if self.stale_after <= TimeDelta::zero() {
            return Err(ConfigError::NotPositive("stale attempt window"));
        }
        check_duration("lockout duration", self.lockout)?;
        check_duration("stale attempt window", self.stale_after)
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutStatus {
    pub locked: bool,
    pub remaining: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutStatus {
    fn locked(until: DateTime<Utc>) -> Self {
        Self {
            locked: true,
            remaining: 0,
            locked_until: Some(until),
        }
    }

    fn open(remaining: u32) -> Self {
        Self {
            locked: false,
            remaining,
            locked_until: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Attempts {
    fail_count: u32,
    last_attempt: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
}

pub struct LockoutGuard {
    config: LockoutConfig,
    clock: Arc<dyn Clock>,
    attempts: Mutex<ExpiringStore<String, Attempts>>,
}

impl LockoutGuard {
    /// # Errors
    /// Returns `ConfigError` if any limit, duration or the capacity is not positive,
    /// or a duration is longer than the store accepts.
    pub fn new(config: LockoutConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        let attempts = ExpiringStore::new(config.capacity)?.with_eviction(
            |identifier: &String, _: &Attempts| {
                debug!(identifier = %identifier, "failed login record evicted");
            },
        );

        Ok(Self {
            config,
            clock,
            attempts: Mutex::new(attempts),
        })
    }

    #[must_use]
    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    /// Record a failed login for `identifier`.
    pub fn record_failure(&self, identifier: &str) -> LockoutStatus {
        let now = self.clock.now();
        let mut attempts = self.attempts.lock();

        let fail_count = match attempts.get(identifier).copied() {
            Some(Attempts {
                locked_until: Some(until),
                ..
            }) if now < until => {
                debug!(identifier, %until, "failed login while locked out");
                return LockoutStatus::locked(until);
            }
            Some(entry) if !self.starts_over(&entry, now) => entry.fail_count.saturating_add(1),
            _ => 1,
        };

        let locked_until = (fail_count >= self.config.max_attempts)
            .then(|| deadline_after(now, self.config.lockout));
        let deadline =
            locked_until.unwrap_or_else(|| deadline_after(now, self.config.stale_after));

        // Every failure moves `last_attempt`, so the record is always renewed.
        attempts.renew(
            identifier.to_string(),
            Attempts {
                fail_count,
                last_attempt: now,
                locked_until,
            },
            deadline,
        );

        match locked_until {
            Some(until) => {
                debug!(identifier, %until, fail_count, "identifier locked out");
                LockoutStatus::locked(until)
            }
            None => LockoutStatus::open(self.config.max_attempts - fail_count),
        }
    }

    /// Current state of `identifier` without recording anything.
    pub fn status(&self, identifier: &str) -> LockoutStatus {
        let now = self.clock.now();
        let attempts = self.attempts.lock();

        match attempts.peek(identifier) {
            Some(Attempts {
                locked_until: Some(until),
                ..
            }) if now < *until => LockoutStatus::locked(*until),
            Some(entry) if !self.starts_over(entry, now) => LockoutStatus::open(
                self.config.max_attempts.saturating_sub(entry.fail_count),
            ),
            _ => LockoutStatus::open(self.config.max_attempts),
        }
    }

    /// Forget every failure of `identifier`, typically after a successful login.
    pub fn reset(&self, identifier: &str) {
        self.attempts.lock().remove(identifier);
    }

    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.attempts.lock().purge_expired(now)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attempts.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attempts.lock().is_empty()
    }

    // A finished lockout or a long quiet period wipes the slate.
    fn starts_over(&self, entry: &Attempts, now: DateTime<Utc>) -> bool {
        entry.locked_until.is_some_and(|until| now >= until)
            || now - entry.last_attempt > self.config.stale_after
    }
}

impl Sweep for LockoutGuard {
    fn name(&self) -> &'static str {
        "lockout"
    }

    fn purge_expired(&self) -> usize {
        Self::purge_expired(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::ManualClock;

    fn guard(config: LockoutConfig) -> (LockoutGuard, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let guard = LockoutGuard::new(config, clock.clone()).unwrap();
        (guard, clock)
    }

    #[test]
    fn defaults_match_login_policy() {
        let config = LockoutConfig::default();
        assert_eq!(config.max_attempts(), 5);
        assert_eq!(config.lockout(), TimeDelta::minutes(15));
        assert_eq!(config.stale_after(), TimeDelta::hours(24));
        assert_eq!(config.capacity(), 10_000);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_epoch());
        assert!(LockoutGuard::new(LockoutConfig::new().with_max_attempts(0), clock.clone()).is_err());
        assert!(LockoutGuard::new(
            LockoutConfig::new().with_lockout(TimeDelta::zero()),
            clock.clone()
        )
        .is_err());
        assert!(LockoutGuard::new(
            LockoutConfig::new().with_stale_after(TimeDelta::seconds(-1)),
            clock.clone()
        )
        .is_err());
        assert!(LockoutGuard::new(LockoutConfig::new().with_capacity(0), clock).is_err());
    }

    #[test]
    fn oversized_durations_are_rejected_at_construction() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_epoch());
        let huge = TimeDelta::days(365 * 300_000);
        assert!(matches!(
            LockoutGuard::new(LockoutConfig::new().with_lockout(huge), clock.clone()),
            Err(ConfigError::OutOfRange("lockout duration"))
        ));
        assert!(matches!(
            LockoutGuard::new(LockoutConfig::new().with_stale_after(huge), clock),
            Err(ConfigError::OutOfRange("stale attempt window"))
        ));
    }

    #[test]
    fn fifth_failure_locks_and_lock_is_not_extended() {
        let (guard, clock) = guard(LockoutConfig::default());

        for expected in [4, 3, 2, 1] {
            let status = guard.record_failure("alice@example.com");
            assert_eq!(status, LockoutStatus::open(expected));
            clock.advance(TimeDelta::seconds(10));
        }

        let last_attempt = clock.now();
        let locked = guard.record_failure("alice@example.com");
        let until = last_attempt + TimeDelta::minutes(15);
        assert_eq!(locked, LockoutStatus::locked(until));

        clock.advance(TimeDelta::minutes(5));
        let again = guard.record_failure("alice@example.com");
        assert_eq!(again, LockoutStatus::locked(until));
        assert_eq!(guard.status("alice@example.com"), LockoutStatus::locked(until));
    }

    #[test]
    fn reset_starts_counting_from_scratch() {
        let (guard, _clock) = guard(LockoutConfig::default());
        for _ in 0..5 {
            guard.record_failure("bob");
        }
        assert!(guard.status("bob").locked);

        guard.reset("bob");
        assert_eq!(guard.record_failure("bob"), LockoutStatus::open(4));
    }

    #[test]
    fn expired_lock_starts_over() {
        let (guard, clock) = guard(LockoutConfig::default());
        for _ in 0..5 {
            guard.record_failure("carol");
        }
        clock.advance(TimeDelta::minutes(15));
        assert!(!guard.status("carol").locked);
        assert_eq!(guard.record_failure("carol"), LockoutStatus::open(4));
    }

    #[test]
    fn stale_failures_are_forgotten() {
        let (guard, clock) = guard(LockoutConfig::default());
        for _ in 0..3 {
            guard.record_failure("dave");
        }
        assert_eq!(guard.status("dave"), LockoutStatus::open(2));

        clock.advance(TimeDelta::hours(24) + TimeDelta::seconds(1));
        assert_eq!(guard.status("dave"), LockoutStatus::open(5));
        assert_eq!(guard.record_failure("dave"), LockoutStatus::open(4));
    }

    #[test]
    fn single_attempt_policy_locks_immediately() {
        let (guard, clock) = guard(LockoutConfig::new().with_max_attempts(1));
        let status = guard.record_failure("erin");
        assert_eq!(status, LockoutStatus::locked(clock.now() + TimeDelta::minutes(15)));
    }

    #[test]
    fn purge_honours_both_lock_and_staleness_deadlines() {
        let (guard, clock) = guard(LockoutConfig::default());
        guard.record_failure("quiet");
        for _ in 0..5 {
            guard.record_failure("locked");
        }

        // The lockout ends long before the quiet record goes stale.
        clock.advance(TimeDelta::minutes(16));
        assert_eq!(guard.purge_expired(), 1);
        assert_eq!(guard.status("quiet"), LockoutStatus::open(4));

        clock.advance(TimeDelta::hours(24));
        assert_eq!(guard.purge_expired(), 1);
        assert!(guard.is_empty());
    }
}
