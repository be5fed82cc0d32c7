//! Maps validated CLI arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{
    limits, tokens, ARG_PORT, ARG_REDIRECT_HOSTS, ARG_SWEEP_INTERVAL_SECONDS,
};
use crate::guard::{SecurityConfig, UrlPolicy};
use anyhow::Result;
use std::time::Duration;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let sweep_interval = matches
        .get_one::<u64>(ARG_SWEEP_INTERVAL_SECONDS)
        .copied()
        .map_or(Duration::from_secs(60), Duration::from_secs);

    let redirect_hosts: Vec<String> = matches
        .get_many::<String>(ARG_REDIRECT_HOSTS)
        .map(|hosts| {
            hosts
                .map(|host| host.trim().to_string())
                .filter(|host| !host.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let limit_opts = limits::Options::parse(matches)?;
    let token_opts = tokens::Options::parse(matches)?;

    let security = SecurityConfig::new()
        .with_rate_limit(limit_opts.rate_limit)
        .with_lockout(limit_opts.lockout)
        .with_csrf(token_opts.csrf)
        .with_password_reset(token_opts.password_reset)
        .with_url_policy(UrlPolicy::new().with_redirect_hosts(redirect_hosts));

    Ok(Action::Server(Args {
        port,
        sweep_interval,
        security,
    }))
}
