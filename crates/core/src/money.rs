use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid amount: '{0}'")]
pub struct AmountParseError(pub String);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    /// `None` when the amount does not fit in an `i64` count of cents.
    pub fn to_cents(self) -> Option<i64> {
        self.0
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|cents| cents.round().to_i64())
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Parses a statement amount such as `"1,250.00"`, `"-85.50"` or `"(85.50)"`.
    /// Thousands separators, currency markers and blanks are ignored.
    pub fn parse_statement(s: &str) -> Result<Self, AmountParseError> {
        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('(').and_then(|b| b.strip_suffix(')')) {
            Some(inner) => (true, inner),
            None => (false, trimmed),
        };
        let cleaned: String = body
            .chars()
            .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
            .collect();
        if cleaned.is_empty() {
            return Err(AmountParseError(s.to_string()));
        }
        let value =
            Decimal::from_str(&cleaned).map_err(|_| AmountParseError(s.to_string()))?;
        let money = Money::from_decimal(if negative { -value } else { value });
        if money.to_cents().is_none() {
            return Err(AmountParseError(s.to_string()));
        }
        Ok(money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse_statement(s)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_round_trip_keeps_two_places() {
        assert_eq!(Money::from_cents(123456).to_string(), "1234.56");
        assert_eq!(Money::from_cents(-5).to_cents(), Some(-5));
    }

    #[test]
    fn parse_statement_strips_thousands_separators() {
        assert_eq!(Money::parse_statement("1,250.00").unwrap().to_cents(), Some(125000));
        assert_eq!(Money::parse_statement(" 500 ").unwrap().to_cents(), Some(50000));
    }

    #[test]
    fn parse_statement_negative_forms() {
        assert_eq!(Money::parse_statement("-85.50").unwrap().to_cents(), Some(-8550));
        assert_eq!(Money::parse_statement("(85.50)").unwrap().to_cents(), Some(-8550));
    }

    #[test]
    fn parse_statement_rejects_garbage() {
        assert!(Money::parse_statement("").is_err());
        assert!(Money::parse_statement("abc").is_err());
        assert!(Money::parse_statement("1.2.3").is_err());
    }

    #[test]
    fn amounts_beyond_cents_range_are_rejected() {
        assert!(Money::parse_statement("99999999999999999999.00").is_err());
        let huge = Money::from_decimal(Decimal::MAX);
        assert_eq!(huge.to_cents(), None);
    }

    #[test]
    fn sum_of_amounts() {
        let total: Money = [150, 250, -100].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.to_cents(), Some(300));
    }
}
