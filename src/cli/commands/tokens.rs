use anyhow::Result;
use clap::{Arg, ArgMatches, Command};

use super::limits::{read, read_seconds};
use crate::guard::{
    state::{CSRF_VAULT, PASSWORD_RESET_VAULT},
    TokenConfig,
};

pub const ARG_CSRF_TTL_SECONDS: &str = "csrf-ttl-seconds";
pub const ARG_CSRF_CAPACITY: &str = "csrf-capacity";
pub const ARG_RESET_TOKEN_TTL_SECONDS: &str = "reset-token-ttl-seconds";
pub const ARG_RESET_TOKEN_CAPACITY: &str = "reset-token-capacity";

#[derive(Debug)]
pub struct Options {
    pub csrf: TokenConfig,
    pub password_reset: TokenConfig,
}

impl Options {
    /// Parse one-time token arguments from matches.
    ///
    /// # Errors
    /// Returns an error if an argument is missing or a TTL is out of range.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            csrf: TokenConfig::new(CSRF_VAULT)
                .with_ttl(read_seconds(matches, ARG_CSRF_TTL_SECONDS)?)
                .with_capacity(read::<usize>(matches, ARG_CSRF_CAPACITY)?),
            password_reset: TokenConfig::new(PASSWORD_RESET_VAULT)
                .with_ttl(read_seconds(matches, ARG_RESET_TOKEN_TTL_SECONDS)?)
                .with_capacity(read::<usize>(matches, ARG_RESET_TOKEN_CAPACITY)?),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CSRF_TTL_SECONDS)
                .long(ARG_CSRF_TTL_SECONDS)
                .help("CSRF token lifetime in seconds")
                .env("CUSTODE_CSRF_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_CSRF_CAPACITY)
                .long(ARG_CSRF_CAPACITY)
                .help("Outstanding CSRF tokens kept before the oldest is evicted")
                .env("CUSTODE_CSRF_CAPACITY")
                .default_value("5000")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_RESET_TOKEN_TTL_SECONDS)
                .long(ARG_RESET_TOKEN_TTL_SECONDS)
                .help("Password reset token lifetime in seconds")
                .env("CUSTODE_RESET_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_RESET_TOKEN_CAPACITY)
                .long(ARG_RESET_TOKEN_CAPACITY)
                .help("Outstanding password reset tokens kept before the oldest is evicted")
                .env("CUSTODE_RESET_TOKEN_CAPACITY")
                .default_value("5000")
                .value_parser(clap::value_parser!(usize)),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn vaults_keep_their_labels() {
        let matches = with_args(Command::new("custode")).get_matches_from(vec![
            "custode",
            "--reset-token-ttl-seconds",
            "600",
        ]);
        let options = Options::parse(&matches).unwrap();

        assert_eq!(options.csrf.label(), "csrf");
        assert_eq!(options.csrf.ttl(), TimeDelta::hours(1));
        assert_eq!(options.csrf.capacity(), 5000);
        assert_eq!(options.password_reset.label(), "password_reset");
        assert_eq!(options.password_reset.ttl(), TimeDelta::minutes(10));
    }

    #[test]
    fn out_of_range_ttl_is_an_error() {
        let matches = with_args(Command::new("custode")).get_matches_from(vec![
            "custode",
            "--csrf-ttl-seconds",
            "9223372036854775807",
        ]);
        assert!(Options::parse(&matches).is_err());
    }
}
