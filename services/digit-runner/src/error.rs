//! Engine error types

use rust_decimal::Decimal;

/// Errors raised by the pure engine components
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EngineError {
    #[error("Precision {0} exceeds the supported maximum of {max}", max = crate::digit::MAX_PRECISION)]
    InvalidPrecision(u32),

    #[error("Stake overflow at loss level {0}")]
    StakeOverflow(u32),

    #[error("Stake must be positive, got {0}")]
    NonPositiveStake(Decimal),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
