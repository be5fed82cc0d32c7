use anyhow::{Context, Result};
use chrono::TimeDelta;
use clap::{Arg, ArgMatches, Command};

use crate::guard::{LockoutConfig, RateLimitConfig};

pub const ARG_RATE_LIMIT_MAX_REQUESTS: &str = "rate-limit-max-requests";
pub const ARG_RATE_LIMIT_WINDOW_SECONDS: &str = "rate-limit-window-seconds";
pub const ARG_RATE_LIMIT_CAPACITY: &str = "rate-limit-capacity";
pub const ARG_LOCKOUT_MAX_ATTEMPTS: &str = "lockout-max-attempts";
pub const ARG_LOCKOUT_SECONDS: &str = "lockout-seconds";
pub const ARG_LOCKOUT_STALE_SECONDS: &str = "lockout-stale-seconds";
pub const ARG_LOCKOUT_CAPACITY: &str = "lockout-capacity";

#[derive(Debug)]
pub struct Options {
    pub rate_limit: RateLimitConfig,
    pub lockout: LockoutConfig,
}

impl Options {
    /// Parse rate limit and lockout arguments from matches.
    ///
    /// # Errors
    /// Returns an error if an argument is missing or a duration is out of range.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let rate_limit = RateLimitConfig::new()
            .with_max_requests(read::<u32>(matches, ARG_RATE_LIMIT_MAX_REQUESTS)?)
            .with_window(read_seconds(matches, ARG_RATE_LIMIT_WINDOW_SECONDS)?)
            .with_capacity(read::<usize>(matches, ARG_RATE_LIMIT_CAPACITY)?);

        let lockout = LockoutConfig::new()
            .with_max_attempts(read::<u32>(matches, ARG_LOCKOUT_MAX_ATTEMPTS)?)
            .with_lockout(read_seconds(matches, ARG_LOCKOUT_SECONDS)?)
            .with_stale_after(read_seconds(matches, ARG_LOCKOUT_STALE_SECONDS)?)
            .with_capacity(read::<usize>(matches, ARG_LOCKOUT_CAPACITY)?);

        Ok(Self {
            rate_limit,
            lockout,
        })
    }
}

pub(super) fn read<T>(matches: &ArgMatches, id: &str) -> Result<T>
where
    T: Clone + Send + Sync + 'static,
{
    matches
        .get_one::<T>(id)
        .cloned()
        .with_context(|| format!("missing required argument: --{id}"))
}

pub(super) fn read_seconds(matches: &ArgMatches, id: &str) -> Result<TimeDelta> {
    let seconds = read::<i64>(matches, id)?;
    TimeDelta::try_seconds(seconds)
        .with_context(|| format!("--{id} is out of range: {seconds}"))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_rate_limit_args(command);
    with_lockout_args(command)
}

fn with_rate_limit_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_MAX_REQUESTS)
                .long(ARG_RATE_LIMIT_MAX_REQUESTS)
                .help("Requests allowed per client within one window")
                .env("CUSTODE_RATE_LIMIT_MAX_REQUESTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .long(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .help("Rate limit window length in seconds")
                .env("CUSTODE_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_CAPACITY)
                .long(ARG_RATE_LIMIT_CAPACITY)
                .help("Clients tracked before the least recently seen is evicted")
                .env("CUSTODE_RATE_LIMIT_CAPACITY")
                .default_value("10000")
                .value_parser(clap::value_parser!(usize)),
        )
}

fn with_lockout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOCKOUT_MAX_ATTEMPTS)
                .long(ARG_LOCKOUT_MAX_ATTEMPTS)
                .help("Consecutive failed logins before an account is locked")
                .env("CUSTODE_LOCKOUT_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_SECONDS)
                .long(ARG_LOCKOUT_SECONDS)
                .help("Lockout duration in seconds")
                .env("CUSTODE_LOCKOUT_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_STALE_SECONDS)
                .long(ARG_LOCKOUT_STALE_SECONDS)
                .help("Seconds without failures after which the count is forgotten")
                .env("CUSTODE_LOCKOUT_STALE_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_CAPACITY)
                .long(ARG_LOCKOUT_CAPACITY)
                .help("Identifiers tracked before the least recently seen is evicted")
                .env("CUSTODE_LOCKOUT_CAPACITY")
                .default_value("10000")
                .value_parser(clap::value_parser!(usize)),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_store_defaults() {
        temp_env::with_vars_unset(
            ["CUSTODE_LOCKOUT_SECONDS", "CUSTODE_RATE_LIMIT_CAPACITY"],
            || {
                let matches =
                    with_args(Command::new("custode")).get_matches_from(vec!["custode"]);
                let options = Options::parse(&matches).unwrap();

                assert_eq!(options.rate_limit.max_requests(), 5);
                assert_eq!(options.rate_limit.window(), TimeDelta::minutes(15));
                assert_eq!(options.rate_limit.capacity(), 10_000);
                assert_eq!(options.lockout.max_attempts(), 5);
                assert_eq!(options.lockout.lockout(), TimeDelta::minutes(15));
                assert_eq!(options.lockout.stale_after(), TimeDelta::hours(24));
                assert_eq!(options.lockout.capacity(), 10_000);
            },
        );
    }

    #[test]
    fn flags_override_defaults() {
        let matches = with_args(Command::new("custode")).get_matches_from(vec![
            "custode",
            "--rate-limit-max-requests",
            "20",
            "--rate-limit-window-seconds",
            "60",
            "--lockout-max-attempts",
            "3",
        ]);
        let options = Options::parse(&matches).unwrap();

        assert_eq!(options.rate_limit.max_requests(), 20);
        assert_eq!(options.rate_limit.window(), TimeDelta::minutes(1));
        assert_eq!(options.lockout.max_attempts(), 3);
    }

    #[test]
    fn out_of_range_seconds_are_an_error() {
        let matches = with_args(Command::new("custode")).get_matches_from(vec![
            "custode",
            "--lockout-seconds",
            "9223372036854775807",
        ]);
        let err = Options::parse(&matches).unwrap_err();
        assert!(err.to_string().contains("--lockout-seconds is out of range"));
    }

    #[test]
    fn env_overrides_defaults() {
        temp_env::with_vars(
            [
                ("CUSTODE_LOCKOUT_SECONDS", Some("60")),
                ("CUSTODE_RATE_LIMIT_CAPACITY", Some("42")),
            ],
            || {
                let matches =
                    with_args(Command::new("custode")).get_matches_from(vec!["custode"]);
                let options = Options::parse(&matches).unwrap();
                assert_eq!(options.lockout.lockout(), TimeDelta::minutes(1));
                assert_eq!(options.rate_limit.capacity(), 42);
            },
        );
    }
}
