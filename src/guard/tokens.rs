//! One-time tokens: CSRF tokens and password-reset tokens.
//!
//! Redemption always removes the token, expired or not, so a token can never
//! be replayed. Tokens are issued with a constant TTL, which keeps issue
//! order and deadline order aligned; a lazy purge runs before every issue.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use tracing::debug;

use super::sweeper::Sweep;
use crate::store::{check_duration, deadline_after, Clock, ConfigError, ExpiringStore};

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_TOKEN_CAPACITY: usize = 5000;
const TOKEN_BYTES: usize = 32;

/// Source of opaque, high-entropy token strings.
pub trait TokenSource: Send + Sync {
    /// # Errors
    /// Returns an error if the entropy source fails.
    fn generate(&self) -> Result<String>;
}

/// 32 bytes from the operating system RNG, base64url without padding.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRngTokenSource;

impl TokenSource for OsRngTokenSource {
    fn generate(&self) -> Result<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate token")?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }
}

#[derive(Clone, Debug)]
pub struct TokenConfig {
    label: &'static str,
    ttl: TimeDelta,
    capacity: usize,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            label: "tokens",
            ttl: TimeDelta::seconds(DEFAULT_TOKEN_TTL_SECONDS),
            capacity: DEFAULT_TOKEN_CAPACITY,
        }
    }
}

impl TokenConfig {
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            ..Self::default()
        }
    }

    /// A zero TTL issues tokens that are already expired.
    #[must_use]
    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    #[must_use]
    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

struct Issued<P> {
    expires_at: DateTime<Utc>,
    payload: P,
}

/// Bounded store of one-time tokens, each carrying a payload `P`.
pub struct TokenVault<P = ()> {
    config: TokenConfig,
    clock: Arc<dyn Clock>,
    source: Arc<dyn TokenSource>,
    tokens: Mutex<ExpiringStore<String, Issued<P>>>,
}

impl<P> TokenVault<P>
where
    P: Send + 'static,
{
    /// # Errors
    /// Returns `ConfigError` if the TTL is negative or too long, or the
    /// capacity is zero.
    pub fn new(
        config: TokenConfig,
        clock: Arc<dyn Clock>,
        source: Arc<dyn TokenSource>,
    ) -> Result<Self, ConfigError> {
        if config.ttl < TimeDelta::zero() {
            return Err(ConfigError::OutOfRange("token ttl"));
        }
        check_duration("token ttl", config.ttl)?;
        let label = config.label;
        let tokens = ExpiringStore::new(config.capacity)?.with_eviction(
            move |_: &String, _: &Issued<P>| {
                debug!(vault = label, "unredeemed token evicted");
            },
        );

        Ok(Self {
            config,
            clock,
            source,
            tokens: Mutex::new(tokens),
        })
    }

    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issue a token carrying `payload`.
    ///
    /// # Errors
    /// Returns an error if the token source fails.
    pub fn issue_with(&self, payload: P) -> Result<String> {
        let token = self.source.generate()?;
        let now = self.clock.now();
        let expires_at = deadline_after(now, self.config.ttl);

        let mut tokens = self.tokens.lock();
        let purged = tokens.purge_expired(now);
        if purged > 0 {
            debug!(vault = self.config.label, purged, "expired tokens purged");
        }
        tokens.renew(
            token.clone(),
            Issued {
                expires_at,
                payload,
            },
            expires_at,
        );

        Ok(token)
    }

    /// Consume `token`, returning its payload if it was still live.
    pub fn redeem_payload(&self, token: &str) -> Option<P> {
        let now = self.clock.now();
        let issued = self.tokens.lock().remove(token)?;
        if now < issued.expires_at {
            Some(issued.payload)
        } else {
            debug!(vault = self.config.label, "expired token presented");
            None
        }
    }

    /// Check `token` without consuming it. An expired token is dropped.
    pub fn inspect(&self, token: &str) -> Option<P>
    where
        P: Clone,
    {
        let now = self.clock.now();
        let mut tokens = self.tokens.lock();
        let live = tokens
            .peek(token)
            .map(|issued| (now < issued.expires_at, issued.payload.clone()));

        match live {
            Some((true, payload)) => Some(payload),
            Some((false, _)) => {
                tokens.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.tokens.lock().purge_expired(now)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }
}

impl TokenVault {
    /// Issue a token with no payload, as used for CSRF protection.
    ///
    /// # Errors
    /// Returns an error if the token source fails.
    pub fn issue(&self) -> Result<String> {
        self.issue_with(())
    }

    /// Consume `token`; `true` only for a live token seen for the first time.
    pub fn redeem(&self, token: &str) -> bool {
        self.redeem_payload(token).is_some()
    }
}

impl<P> Sweep for TokenVault<P>
where
    P: Send + 'static,
{
    fn name(&self) -> &'static str {
        self.config.label
    }

    fn purge_expired(&self) -> usize {
        Self::purge_expired(self)
    }
}
