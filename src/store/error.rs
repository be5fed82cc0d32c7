//! Configuration errors raised when a store is constructed.

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("capacity must be greater than zero")]
    ZeroCapacity,
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("{0} is out of range")]
    OutOfRange(&'static str),
}
