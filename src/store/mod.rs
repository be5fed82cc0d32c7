//! Building blocks shared by every security store: a bounded LRU map, a
//! deadline index, the pair of them behind a touch/renew API, and the clock.

mod bounded;
mod clock;
mod error;
mod expiring;
mod expiry;

pub use bounded::{BoundedMap, Entries};
pub use clock::{
    check_duration, deadline_after, Clock, ManualClock, SystemClock, MAX_DURATION_DAYS,
};
pub use error::ConfigError;
pub use expiring::ExpiringStore;
pub use expiry::ExpiryIndex;
