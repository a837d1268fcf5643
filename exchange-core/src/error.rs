//! Error types for the exchange core

use thiserror::Error;

/// Result type for exchange operations
pub type Result<T> = std::result::Result<T, Error>;

/// Exchange errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range input, rejected before any state is read
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown account or request id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Account cash (or internal MRX) does not cover the operation
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Pool cannot absorb the operation (minimum pool, anti-drain guard)
    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    /// Pool price would drop below the configured floor
    #[error("Price floor violation: {0}")]
    PriceFloorViolation(String),

    /// Per-user daily trading cap would be exceeded
    #[error("Daily limit exceeded: {0}")]
    DailyLimitExceeded(String),

    /// Pool has no MRX reserve, price is undefined
    #[error("Market unavailable: {0}")]
    MarketUnavailable(String),

    /// Record store failure (corrupt row, missing header, ...)
    #[error("Storage error: {0}")]
    Storage(String),

    /// TSV encode/decode error
    #[error("Record codec error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Writer mailbox closed or reply dropped
    #[error("Concurrency error: {0}")]
    Concurrency(String),
}

/// Stable classification of [`Error`] for the routing layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::Validation`]
    Validation,
    /// See [`Error::NotFound`]
    NotFound,
    /// See [`Error::InsufficientBalance`]
    InsufficientBalance,
    /// See [`Error::InsufficientLiquidity`]
    InsufficientLiquidity,
    /// See [`Error::PriceFloorViolation`]
    PriceFloorViolation,
    /// See [`Error::DailyLimitExceeded`]
    DailyLimitExceeded,
    /// See [`Error::MarketUnavailable`]
    MarketUnavailable,
    /// Storage, IO, codec, configuration and mailbox failures
    Storage,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InsufficientBalance(_) => ErrorKind::InsufficientBalance,
            Error::InsufficientLiquidity(_) => ErrorKind::InsufficientLiquidity,
            Error::PriceFloorViolation(_) => ErrorKind::PriceFloorViolation,
            Error::DailyLimitExceeded(_) => ErrorKind::DailyLimitExceeded,
            Error::MarketUnavailable(_) => ErrorKind::MarketUnavailable,
            Error::Storage(_)
            | Error::Csv(_)
            | Error::Io(_)
            | Error::Config(_)
            | Error::Concurrency(_) => ErrorKind::Storage,
        }
    }

    /// True for failures the caller cannot recover from by changing input
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_errors_are_recoverable() {
        assert!(!Error::PriceFloorViolation("x".into()).is_fatal());
        assert!(!Error::DailyLimitExceeded("x".into()).is_fatal());
        assert_eq!(
            Error::MarketUnavailable("x".into()).kind(),
            ErrorKind::MarketUnavailable
        );
    }

    #[test]
    fn test_io_errors_are_fatal() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
