use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional digits every amount is kept at.
pub const CENT_SCALE: u32 = 2;

/// Largest magnitude accepted from outside, in cents (one trillion).
///
/// Sums of accepted amounts stay far below `Decimal::MAX`, so balances over
/// any realistic number of expenses cannot overflow.
pub const MAX_CENTS: i64 = 100_000_000_000_000;

/// A signed amount of money, always held at exactly two fractional digits.
///
/// Results of arithmetic are rounded to the cent half-up (midpoint away from
/// zero). Values coming from outside are rejected when they carry more
/// precision than a cent instead of being rounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount {0} has more than two decimal places")]
    SubCentPrecision(Decimal),
    #[error("amount {0} is larger than the maximum of {max}", max = Money::max())]
    OutOfRange(Decimal),
    #[error("{0:?} is not a valid amount")]
    Unparseable(String),
}

impl Money {
    pub fn zero() -> Self {
        Money(Decimal::new(0, CENT_SCALE))
    }

    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, CENT_SCALE))
    }

    /// The largest amount `from_decimal` accepts. Its negation is the smallest.
    pub fn max() -> Self {
        Money::from_cents(MAX_CENTS)
    }

    /// Exact conversion, failing on sub-cent precision or magnitudes beyond
    /// [`Money::max`].
    pub fn from_decimal(value: Decimal) -> Result<Self, MoneyError> {
        if value.abs() > Money::max().0 {
            return Err(MoneyError::OutOfRange(value));
        }
        if value.round_dp(CENT_SCALE) != value {
            return Err(MoneyError::SubCentPrecision(value));
        }
        Ok(Self::at_cent_scale(value))
    }

    /// Rounds `value` to the nearest cent, half-up.
    pub fn rounded(value: Decimal) -> Self {
        Self::at_cent_scale(
            value.round_dp_with_strategy(CENT_SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Rounds `value` down to the cent.
    pub fn floored(value: Decimal) -> Self {
        Self::at_cent_scale(
            value.round_dp_with_strategy(CENT_SCALE, RoundingStrategy::ToNegativeInfinity),
        )
    }

    fn at_cent_scale(mut value: Decimal) -> Self {
        value.rescale(CENT_SCALE);
        Money(value)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    /// `None` when the sum does not fit in a `Decimal`.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Money::rounded)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Money::rounded)
    }

    /// Adds up `amounts`, or `None` on overflow.
    pub fn checked_sum<'a>(amounts: impl IntoIterator<Item = &'a Money>) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |total, amount| total.checked_add(*amount))
    }

    /// Share of `self` divided into `parts`, rounded down to the cent.
    pub fn floor_share(self, parts: usize) -> Self {
        Self::floored(self.0 / Decimal::from(parts))
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::from_decimal(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value =
            Decimal::from_str(s.trim()).map_err(|_| MoneyError::Unparseable(s.to_string()))?;
        Money::from_decimal(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Money::rounded(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Money::rounded(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn displays_two_digits() {
        assert_eq!(Money::from_cents(1000).to_string(), "10.00");
        assert_eq!(Money::from_decimal(dec!(7)).unwrap().to_string(), "7.00");
        assert_eq!(Money::from_decimal(dec!(-0.5)).unwrap().to_string(), "-0.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn rejects_sub_cent_input() {
        assert_eq!(
            Money::from_decimal(dec!(10.005)),
            Err(MoneyError::SubCentPrecision(dec!(10.005)))
        );
        assert!("1.001".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert_eq!("12.50".parse::<Money>().unwrap(), Money::from_cents(1250));
        // Trailing zeros beyond the cent are still a cent amount.
        assert_eq!("3.100".parse::<Money>().unwrap(), Money::from_cents(310));
    }

    #[test]
    fn rounds_half_up() {
        assert_eq!(Money::rounded(dec!(0.005)), Money::from_cents(1));
        assert_eq!(Money::rounded(dec!(0.015)), Money::from_cents(2));
        assert_eq!(Money::rounded(dec!(-0.005)), Money::from_cents(-1));
        assert_eq!(Money::rounded(dec!(0.004)), Money::zero());
    }

    #[test]
    fn floor_share_rounds_down() {
        assert_eq!(Money::from_cents(1000).floor_share(3), Money::from_cents(333));
        assert_eq!(Money::from_cents(1).floor_share(2), Money::zero());
        assert_eq!(Money::from_cents(999).floor_share(1), Money::from_cents(999));
    }

    #[test]
    fn sums_without_drift() {
        let total: Money = std::iter::repeat(Money::from_cents(10)).take(10).sum();
        assert_eq!(total, Money::from_cents(100));
        assert_eq!(Money::from_cents(30) - Money::from_cents(10), Money::from_cents(20));
    }

    #[test]
    fn amounts_beyond_the_maximum_are_rejected() {
        assert_eq!(Money::from_decimal(Money::max().as_decimal()), Ok(Money::max()));
        assert_eq!(
            Money::from_decimal(-Money::max().as_decimal()),
            Ok(-Money::max())
        );
        let just_over = Money::max().as_decimal() + dec!(0.01);
        assert_eq!(Money::from_decimal(just_over), Err(MoneyError::OutOfRange(just_over)));
        assert_eq!(
            Money::from_decimal(Decimal::MAX),
            Err(MoneyError::OutOfRange(Decimal::MAX))
        );
        assert!(serde_json::from_str::<Money>("\"79228162514264337593543950335\"").is_err());
        assert!(serde_json::from_str::<Money>("\"-1000000000000.01\"").is_err());
    }

    #[test]
    fn checked_arithmetic_reports_overflow() {
        let huge = Money(Decimal::MAX);
        assert_eq!(huge.checked_add(huge), None);
        assert_eq!((-huge).checked_sub(huge), None);
        assert_eq!(Money::checked_sum(&[huge, huge]), None);
        assert_eq!(
            Money::checked_sum(&[Money::max(), Money::max()]),
            Some(Money::from_cents(2 * MAX_CENTS))
        );
        assert_eq!(
            Money::from_cents(500).checked_sub(Money::from_cents(200)),
            Some(Money::from_cents(300))
        );
    }

    #[test]
    fn serde_uses_decimal_strings() {
        let json = serde_json::to_string(&Money::from_cents(333)).unwrap();
        assert_eq!(json, "\"3.33\"");
        let parsed: Money = serde_json::from_str("\"3.33\"").unwrap();
        assert_eq!(parsed, Money::from_cents(333));
        let from_number: Money = serde_json::from_str("12.5").unwrap();
        assert_eq!(from_number, Money::from_cents(1250));
        assert!(serde_json::from_str::<Money>("\"0.001\"").is_err());
    }
}
