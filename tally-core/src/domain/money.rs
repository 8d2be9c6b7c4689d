//! Money helpers
//!
//! Balances and amounts are exact decimals stored as `DECIMAL(18, 4)`.
//! Nothing in the ledger path ever goes through floating point.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use super::result::{Error, Result};

/// Number of fractional digits kept for every stored amount
pub const MONEY_SCALE: u32 = 4;

/// Largest value representable by the `DECIMAL(18, 4)` storage columns
pub fn max_money() -> Decimal {
    // 14 integer digits, 4 fractional digits
    Decimal::new(999_999_999_999_999_999, MONEY_SCALE)
}

/// Validate a movement amount: strictly positive, at most 4 decimals,
/// within storage range.
pub fn validate_amount(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(Error::validation("amount must be greater than zero"));
    }
    check_precision(amount)
}

/// Validate an opening balance: zero is allowed, negatives are not.
pub fn validate_opening_balance(balance: Decimal) -> Result<Decimal> {
    if balance < Decimal::ZERO {
        return Err(Error::validation("opening balance cannot be negative"));
    }
    check_precision(balance)
}

fn check_precision(value: Decimal) -> Result<Decimal> {
    let normalized = value.normalize();
    if normalized.scale() > MONEY_SCALE {
        return Err(Error::validation(format!(
            "amount {} has more than {} decimal places",
            value, MONEY_SCALE
        )));
    }
    if normalized > max_money() {
        return Err(Error::validation(format!("amount {} is too large", value)));
    }
    Ok(normalized)
}

/// Parse a user-supplied amount string
pub fn parse_amount(input: &str) -> Result<Decimal> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("amount is empty"));
    }
    let amount = Decimal::from_str(trimmed)
        .map_err(|_| Error::validation(format!("invalid amount: {}", trimmed)))?;
    validate_amount(amount)
}

/// Compute interest for a balance, rounded to storage precision with
/// banker's rounding. Returns `None` on overflow.
pub fn compute_interest(balance: Decimal, rate: Decimal) -> Option<Decimal> {
    balance
        .checked_mul(rate)
        .map(|v| v.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointNearestEven))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_amount() {
        assert_eq!(validate_amount(dec!(100.00)).unwrap(), dec!(100));
        assert!(validate_amount(dec!(0)).is_err());
        assert!(validate_amount(dec!(-5)).is_err());
        assert!(validate_amount(dec!(0.00001)).is_err());
        assert!(validate_amount(dec!(0.0001)).is_ok());
    }

    #[test]
    fn test_trailing_zeros_do_not_count_as_precision() {
        assert!(validate_amount(dec!(1.230000)).is_ok());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 12.5 ").unwrap(), dec!(12.5));
        assert!(parse_amount("").is_err());
        assert!(parse_amount("ten").is_err());
        assert!(parse_amount("-1").is_err());
    }

    #[test]
    fn test_amount_over_storage_range_rejected() {
        assert!(validate_amount(dec!(100000000000000)).is_err());
        assert!(validate_amount(dec!(99999999999999.9999)).is_ok());
    }

    #[test]
    fn test_compute_interest_rounds_half_even() {
        assert_eq!(compute_interest(dec!(1000.00), dec!(0.04)), Some(dec!(40.00)));
        // 0.12345 -> 0.1234 (half to even), 0.12355 -> 0.1236
        assert_eq!(compute_interest(dec!(12.345), dec!(0.01)), Some(dec!(0.1234)));
        assert_eq!(compute_interest(dec!(12.355), dec!(0.01)), Some(dec!(0.1236)));
    }
}
