//! # Custode
//!
//! Ephemeral security state for an authentication backend. Every store here
//! is in-memory, bounded, and forgets on its own:
//!
//! - [`guard::RateLimiter`]: fixed-window request counting per client.
//! - [`guard::LockoutGuard`]: consecutive failed logins and timed lockouts.
//! - [`guard::TokenVault`]: one-time tokens (CSRF, password reset).
//! - [`guard::UserDirectory`]: users indexed by id, email, username and
//!   external provider.
//!
//! Stores are bounded by [`store::BoundedMap`], which evicts the least
//! recently used entry once full, and expire through [`store::ExpiryIndex`],
//! which lets a purge visit only the entries that are actually expired.
//! [`guard::SecurityState`] owns one of each and [`guard::Sweeper`] purges
//! them on an interval.
//!
//! State lives for the lifetime of the process and is not shared between
//! instances.

pub mod api;
pub mod cli;
pub mod guard;
pub mod store;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
