//! Composition root owning one instance of every security store.

use std::sync::Arc;

use super::{
    identity::UrlPolicy,
    lockout::{LockoutConfig, LockoutGuard},
    rate_limit::{RateLimitConfig, RateLimiter},
    sweeper::Sweeper,
    tokens::{OsRngTokenSource, TokenConfig, TokenSource, TokenVault},
    users::UserDirectory,
};
use crate::store::{Clock, ConfigError, SystemClock};

pub const CSRF_VAULT: &str = "csrf";
pub const PASSWORD_RESET_VAULT: &str = "password_reset";

#[derive(Clone, Debug)]
pub struct SecurityConfig {
    rate_limit: RateLimitConfig,
    lockout: LockoutConfig,
    csrf: TokenConfig,
    password_reset: TokenConfig,
    url_policy: UrlPolicy,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            lockout: LockoutConfig::default(),
            csrf: TokenConfig::new(CSRF_VAULT),
            password_reset: TokenConfig::new(PASSWORD_RESET_VAULT),
            url_policy: UrlPolicy::default(),
        }
    }
}

impl SecurityConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    #[must_use]
    pub fn with_lockout(mut self, lockout: LockoutConfig) -> Self {
        self.lockout = lockout;
        self
    }

    #[must_use]
    pub fn with_csrf(mut self, csrf: TokenConfig) -> Self {
        self.csrf = csrf;
        self
    }

    #[must_use]
    pub fn with_password_reset(mut self, password_reset: TokenConfig) -> Self {
        self.password_reset = password_reset;
        self
    }

    #[must_use]
    pub fn with_url_policy(mut self, url_policy: UrlPolicy) -> Self {
        self.url_policy = url_policy;
        self
    }

    #[must_use]
    pub fn rate_limit(&self) -> &RateLimitConfig {
        &self.rate_limit
    }

    #[must_use]
    pub fn lockout(&self) -> &LockoutConfig {
        &self.lockout
    }

    #[must_use]
    pub fn csrf(&self) -> &TokenConfig {
        &self.csrf
    }

    #[must_use]
    pub fn password_reset(&self) -> &TokenConfig {
        &self.password_reset
    }

    #[must_use]
    pub fn url_policy(&self) -> &UrlPolicy {
        &self.url_policy
    }
}

/// Every store the request layer needs, built once at startup and shared.
#[derive(Clone)]
pub struct SecurityState {
    rate_limiter: Arc<RateLimiter>,
    lockout: Arc<LockoutGuard>,
    csrf: Arc<TokenVault>,
    password_reset: Arc<TokenVault<String>>,
    users: Arc<UserDirectory>,
    url_policy: Arc<UrlPolicy>,
}

impl SecurityState {
    /// # Errors
    /// Returns `ConfigError` if any store configuration is invalid.
    pub fn new(
        config: SecurityConfig,
        clock: Arc<dyn Clock>,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit, clock.clone())?),
            lockout: Arc::new(LockoutGuard::new(config.lockout, clock.clone())?),
            csrf: Arc::new(TokenVault::new(config.csrf, clock.clone(), tokens.clone())?),
            password_reset: Arc::new(TokenVault::new(
                config.password_reset,
                clock.clone(),
                tokens,
            )?),
            users: Arc::new(UserDirectory::new(clock)),
            url_policy: Arc::new(config.url_policy),
        })
    }

    /// Stores on the wall clock with tokens from the OS RNG.
    ///
    /// # Errors
    /// Returns `ConfigError` if any store configuration is invalid.
    pub fn from_config(config: SecurityConfig) -> Result<Self, ConfigError> {
        Self::new(config, Arc::new(SystemClock), Arc::new(OsRngTokenSource))
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    #[must_use]
    pub fn lockout(&self) -> &LockoutGuard {
        &self.lockout
    }

    #[must_use]
    pub fn csrf(&self) -> &TokenVault {
        &self.csrf
    }

    #[must_use]
    pub fn password_reset(&self) -> &TokenVault<String> {
        &self.password_reset
    }

    #[must_use]
    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    #[must_use]
    pub fn url_policy(&self) -> &UrlPolicy {
        &self.url_policy
    }

    /// A sweeper over every store that expires entries.
    #[must_use]
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new()
            .with_target(self.rate_limiter.clone())
            .with_target(self.lockout.clone())
            .with_target(self.csrf.clone())
            .with_target(self.password_reset.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::ManualClock;
    use chrono::TimeDelta;

    #[test]
    fn default_config_names_both_vaults() {
        let config = SecurityConfig::default();
        assert_eq!(config.csrf().label(), "csrf");
        assert_eq!(config.password_reset().label(), "password_reset");
        assert_eq!(config.csrf().ttl(), TimeDelta::hours(1));
        assert_eq!(config.csrf().capacity(), 5000);
    }

    #[test]
    fn invalid_store_config_fails_construction() {
        let config = SecurityConfig::new()
            .with_rate_limit(RateLimitConfig::new().with_max_requests(0));
        assert!(matches!(
            SecurityState::from_config(config),
            Err(ConfigError::NotPositive("max requests"))
        ));
    }

    #[test]
    fn sweeper_covers_every_expiring_store() {
        let clock = Arc::new(ManualClock::at_epoch());
        let state = SecurityState::new(
            SecurityConfig::default(),
            clock.clone(),
            Arc::new(OsRngTokenSource),
        )
        .unwrap();

        state.rate_limiter().check("198.51.100.4");
        state.lockout().record_failure("frank@example.com");
        state.csrf().issue().unwrap();
        state
            .password_reset()
            .issue_with("frank@example.com".to_string())
            .unwrap();

        let sweeper = state.sweeper();
        assert_eq!(sweeper.len(), 4);
        assert_eq!(sweeper.run_once(), 0);

        clock.advance(TimeDelta::days(2));
        assert_eq!(sweeper.run_once(), 4);
        assert!(state.rate_limiter().is_empty());
        assert!(state.lockout().is_empty());
        assert!(state.csrf().is_empty());
        assert!(state.password_reset().is_empty());
    }
}
