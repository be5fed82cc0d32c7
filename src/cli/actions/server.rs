use crate::{
    api,
    guard::{SecurityConfig, SecurityState},
};
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub sweep_interval: Duration,
    pub security: SecurityConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if a store configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!(config = ?args.security, "building security state");

    let state = SecurityState::from_config(args.security)
        .context("Invalid security store configuration")?;

    api::new(args.port, state, args.sweep_interval).await
}
