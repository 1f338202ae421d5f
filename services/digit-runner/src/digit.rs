//! Last-digit extraction from tick quotes

use crate::error::{EngineError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Largest precision a `Decimal` can carry
pub const MAX_PRECISION: u32 = 28;

/// How a quote is brought to the configured number of decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Round half away from zero, like fixed-point formatting
    #[default]
    Round,
    /// Drop excess decimals
    Truncate,
}

impl ExtractionMode {
    fn strategy(self) -> RoundingStrategy {
        match self {
            ExtractionMode::Round => RoundingStrategy::MidpointAwayFromZero,
            ExtractionMode::Truncate => RoundingStrategy::ToZero,
        }
    }
}

/// Last significant digit of `quote` written with exactly `precision` decimals.
///
/// Quotes with fewer decimals are zero-padded, so `1234.5` at precision 2
/// yields 0. The sign is ignored.
pub fn extract(quote: Decimal, precision: u32, mode: ExtractionMode) -> Result<u8> {
    if precision > MAX_PRECISION {
        return Err(EngineError::InvalidPrecision(precision));
    }

    let fixed = quote.abs().round_dp_with_strategy(precision, mode.strategy());

    // round_dp never raises the scale; a shorter scale means a padded zero
    if fixed.scale() < precision {
        return Ok(0);
    }

    Ok((fixed.mantissa() % 10) as u8)
}

/// Last two decimals of `quote` as (tens, units), zero-padded like [`extract`].
///
/// `None` below two decimals of precision.
pub fn extract_pair(quote: Decimal, precision: u32, mode: ExtractionMode) -> Result<Option<[u8; 2]>> {
    if precision > MAX_PRECISION {
        return Err(EngineError::InvalidPrecision(precision));
    }
    if precision < 2 {
        return Ok(None);
    }

    let fixed = quote.abs().round_dp_with_strategy(precision, mode.strategy());
    let m = fixed.mantissa();
    let pair = match precision - fixed.scale() {
        0 => [((m / 10) % 10) as u8, (m % 10) as u8],
        1 => [(m % 10) as u8, 0],
        _ => [0, 0],
    };
    Ok(Some(pair))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_extract_exact_precision() {
        assert_eq!(extract(d("1234.56"), 2, ExtractionMode::Round).unwrap(), 6);
        assert_eq!(extract(d("6543.217"), 3, ExtractionMode::Round).unwrap(), 7);
        assert_eq!(extract(d("987"), 0, ExtractionMode::Round).unwrap(), 7);
    }

    #[test]
    fn test_short_quotes_are_zero_padded() {
        assert_eq!(extract(d("1234.5"), 2, ExtractionMode::Round).unwrap(), 0);
        assert_eq!(extract(d("1234"), 3, ExtractionMode::Truncate).unwrap(), 0);
        assert_eq!(extract(d("1234.50"), 2, ExtractionMode::Truncate).unwrap(), 0);
    }

    #[test]
    fn test_round_vs_truncate() {
        let quote = d("1234.567");
        assert_eq!(extract(quote, 2, ExtractionMode::Round).unwrap(), 7);
        assert_eq!(extract(quote, 2, ExtractionMode::Truncate).unwrap(), 6);

        // Midpoint rounds away from zero
        assert_eq!(extract(d("10.125"), 2, ExtractionMode::Round).unwrap(), 3);
        // Rounding can carry into the integer part
        assert_eq!(extract(d("9.996"), 2, ExtractionMode::Round).unwrap(), 0);
    }

    #[test]
    fn test_negative_quotes_use_magnitude() {
        assert_eq!(extract(d("-12.34"), 2, ExtractionMode::Round).unwrap(), 4);
    }

    #[test]
    fn test_extract_pair() {
        let mode = ExtractionMode::Round;
        assert_eq!(extract_pair(d("6543.45"), 2, mode).unwrap(), Some([4, 5]));
        assert_eq!(extract_pair(d("6543.5"), 2, mode).unwrap(), Some([5, 0]));
        assert_eq!(extract_pair(d("6543"), 3, mode).unwrap(), Some([0, 0]));
        assert_eq!(extract_pair(d("6543.4"), 1, mode).unwrap(), None);
    }

    #[test]
    fn test_precision_limit() {
        assert_eq!(
            extract(d("1.5"), 29, ExtractionMode::Round),
            Err(EngineError::InvalidPrecision(29))
        );
    }
}
