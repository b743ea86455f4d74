//! Monetary amounts bound to a currency
//!
//! Amounts are `Decimal`, rounded to the currency's settlement precision on
//! construction. Mixing currencies in arithmetic is a programming error and
//! panics. Serialized as `"<amount> <CODE>"` strings.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::currency::Currency;
use crate::errors::ValidationError;

/// A decimal amount in a specific currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Create a new amount, rounding to the currency precision.
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        let amount = amount.round_dp_with_strategy(
            currency.precision as u32,
            RoundingStrategy::MidpointAwayFromZero,
        );
        Self { amount, currency }
    }

    /// Zero in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    fn assert_same_currency(&self, other: &Self) {
        assert_eq!(
            self.currency.code, other.currency.code,
            "currency mismatch: {} vs {}",
            self.currency.code, other.currency.code
        );
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        self.assert_same_currency(&rhs);
        Self::new(self.amount + rhs.amount, self.currency)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.assert_same_currency(&rhs);
        self.amount += rhs.amount;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self.assert_same_currency(&rhs);
        Self::new(self.amount - rhs.amount, self.currency)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.assert_same_currency(&rhs);
        self.amount -= rhs.amount;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.amount, self.currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Pad the amount to the currency precision for a stable wire form.
        let mut amount = self.amount;
        amount.rescale(self.currency.precision as u32);
        write!(f, "{} {}", amount, self.currency.code)
    }
}

impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (amount, code) = s.split_once(' ').ok_or(ValidationError::Invalid {
            field: "money",
            reason: "expected '<amount> <CODE>'".to_string(),
        })?;
        let amount = Decimal::from_str(amount).map_err(|e| ValidationError::Invalid {
            field: "money",
            reason: e.to_string(),
        })?;
        let currency =
            Currency::from_code(code).unwrap_or_else(|| Currency::default_for(code));
        Ok(Self::new(amount, currency))
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
