//! Monetary value objects.
//!
//! Every amount that feeds a total is an integer count of minor currency
//! units. Percentages are applied with truncating division, so
//! `apply_percentage` always rounds toward zero.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while constructing monetary values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// A major-unit amount does not fit into minor units.
    #[error("Amount {0} is out of range for minor units")]
    OutOfRange(Decimal),

    /// A percentage outside `[0, 100]`.
    #[error("Invalid percentage: {0} (must be between 0 and 100)")]
    InvalidPercent(Decimal),

    /// A currency code that is not three ASCII letters.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),
}

/// Money amount in minor currency units (e.g. 1000 = 10.00).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    minor: i64,
}

impl Money {
    /// Creates a new Money amount from minor units.
    pub const fn from_minor(minor: i64) -> Self {
        Self { minor }
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self { minor: 0 }
    }

    /// Converts a major-unit decimal (e.g. `19.99`) into minor units.
    ///
    /// Sub-minor precision is truncated toward zero.
    pub fn from_major(major: Decimal) -> Result<Self, MoneyError> {
        let scaled = major
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(MoneyError::OutOfRange(major))?;
        let minor = scaled.trunc().to_i64().ok_or(MoneyError::OutOfRange(major))?;
        Ok(Self { minor })
    }

    /// Returns the amount in major units. Display only; never feed it back into totals.
    pub fn to_major(&self) -> Decimal {
        Decimal::new(self.minor, 2)
    }

    /// Returns the amount in minor units.
    pub const fn minor(&self) -> i64 {
        self.minor
    }

    /// Returns true if the amount is positive.
    pub const fn is_positive(&self) -> bool {
        self.minor > 0
    }

    /// Returns true if the amount is zero.
    pub const fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Returns true if the amount is negative.
    pub const fn is_negative(&self) -> bool {
        self.minor < 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            minor: self.minor * i64::from(quantity),
        }
    }

    /// Multiplies by a quantity, or `None` when the product does not fit.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.minor.checked_mul(i64::from(quantity)).map(Money::from_minor)
    }

    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.minor.checked_add(other.minor).map(Money::from_minor)
    }

    /// Applies a percentage: `amount * percent / 100`, truncated toward zero.
    pub fn apply_percentage(&self, percent: Percent) -> Money {
        let product = Decimal::from(self.minor) * percent.value() / Decimal::ONE_HUNDRED;
        // |product| <= |minor| because percent <= 100, so the conversion cannot overflow.
        Money {
            minor: product.trunc().to_i64().unwrap_or(0),
        }
    }

    /// Returns the amount floored at zero.
    pub fn non_negative(self) -> Money {
        self.max(Money::zero())
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.minor < 0 { "-" } else { "" };
        let abs = self.minor.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            minor: self.minor + rhs.minor,
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            minor: self.minor - rhs.minor,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.minor += rhs.minor;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.minor -= rhs.minor;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A percentage in the closed range `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percent(Decimal);

impl Percent {
    /// Creates a percentage, rejecting values outside `[0, 100]`.
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(MoneyError::InvalidPercent(value));
        }
        Ok(Self(value))
    }

    /// Creates a whole-number percentage.
    pub fn from_whole(value: u32) -> Result<Self, MoneyError> {
        Self::new(Decimal::from(value))
    }

    /// Returns the percentage value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Percent {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percent> for Decimal {
    fn from(p: Percent) -> Self {
        p.0
    }
}

impl std::fmt::Display for Percent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}

/// ISO-4217 style three letter currency code, stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parses a currency code, upper-casing it.
    pub fn new(code: impl AsRef<str>) -> Result<Self, MoneyError> {
        let code = code.as_ref().trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(MoneyError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        Self("USD".to_string())
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shipping weight in whole grams.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Weight(u64);

impl Weight {
    /// Creates a weight from grams.
    pub const fn from_grams(grams: u64) -> Self {
        Self(grams)
    }

    /// Returns zero weight.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the weight in grams.
    pub const fn grams(&self) -> u64 {
        self.0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Weight {
        Weight(self.0 * u64::from(quantity))
    }

    pub fn checked_multiply(&self, quantity: u32) -> Option<Weight> {
        self.0.checked_mul(u64::from(quantity)).map(Weight)
    }

    pub fn checked_add(&self, other: Weight) -> Option<Weight> {
        self.0.checked_add(other.0).map(Weight)
    }
}

impl std::ops::Add for Weight {
    type Output = Weight;

    fn add(self, rhs: Self) -> Self::Output {
        Weight(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Weight {
    fn sum<I: Iterator<Item = Weight>>(iter: I) -> Self {
        iter.fold(Weight::zero(), |acc, w| acc + w)
    }
}

impl std::fmt::Display for Weight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}g", self.0)
    }
}
