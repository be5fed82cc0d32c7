//! Security stores consulted by the authentication layer.
//!
//! Each store owns its own lock and never calls into another store. They are
//! wired together only by [`SecurityState`].

pub mod identity;
pub mod lockout;
pub mod rate_limit;
pub mod state;
pub mod sweeper;
pub mod tokens;
pub mod users;

/// Entries kept by the rate limiter and lockout guard before LRU eviction.
pub const DEFAULT_STORE_CAPACITY: usize = 10_000;

pub use identity::{client_identifier, UrlPolicy};
pub use lockout::{LockoutConfig, LockoutGuard, LockoutStatus};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter};
pub use state::{SecurityConfig, SecurityState};
pub use sweeper::{Sweep, Sweeper};
pub use tokens::{OsRngTokenSource, TokenConfig, TokenSource, TokenVault};
pub use users::{DirectoryError, ExternalProfile, User, UserDirectory};
