//! Time sources for the stores.

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use super::ConfigError;

/// Longest window, lockout, staleness period or TTL a store accepts.
pub const MAX_DURATION_DAYS: i64 = 100 * 365;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reject `duration` when it exceeds [`MAX_DURATION_DAYS`].
///
/// # Errors
/// Returns `ConfigError::OutOfRange` naming the setting.
pub fn check_duration(name: &'static str, duration: TimeDelta) -> Result<(), ConfigError> {
    match TimeDelta::try_days(MAX_DURATION_DAYS) {
        Some(max) if duration <= max => Ok(()),
        _ => Err(ConfigError::OutOfRange(name)),
    }
}

/// `now + delta`, clamped to the representable range.
#[must_use]
pub fn deadline_after(now: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(delta).unwrap_or(if delta < TimeDelta::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to, for deterministic tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Clock frozen at the Unix epoch.
    #[must_use]
    pub fn at_epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock();
        *now += delta;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::at_epoch();
        assert_eq!(clock.now(), DateTime::<Utc>::UNIX_EPOCH);

        clock.advance(TimeDelta::seconds(90));
        assert_eq!(clock.now(), DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(90));

        clock.set(DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(clock.now(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn durations_past_the_ceiling_are_rejected() {
        let max = TimeDelta::days(MAX_DURATION_DAYS);
        assert_eq!(check_duration("window", max), Ok(()));
        assert_eq!(
            check_duration("window", max + TimeDelta::seconds(1)),
            Err(ConfigError::OutOfRange("window"))
        );
        assert_eq!(
            check_duration("window", TimeDelta::days(365 * 300_000)),
            Err(ConfigError::OutOfRange("window"))
        );
    }

    #[test]
    fn deadline_saturates_at_the_end_of_time() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        assert_eq!(
            deadline_after(now, TimeDelta::hours(1)),
            now + TimeDelta::hours(1)
        );
        assert_eq!(
            deadline_after(DateTime::<Utc>::MAX_UTC, TimeDelta::seconds(1)),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn system_clock_is_close_to_utc_now() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }
}
