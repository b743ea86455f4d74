//! Fixed-point price and quantity types
//!
//! Both types carry an integer mantissa at a fixed 10^9 scale together with a
//! display precision (0..=9). All arithmetic is integer arithmetic on the
//! mantissa, so results are exact and bit-for-bit reproducible across runs.
//! Serialized as decimal strings to prevent JSON number precision loss.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};
use std::str::FromStr;

use crate::errors::ValidationError;

/// Internal resolution: every mantissa is scaled by 10^9.
pub const FIXED_SCALAR: i128 = 1_000_000_000;

/// Maximum representable precision.
pub const MAX_PRECISION: u8 = 9;

/// Mantissa step for one unit at the given display precision.
#[inline]
const fn precision_step(precision: u8) -> i128 {
    let mut step = FIXED_SCALAR;
    let mut p = 0;
    while p < precision {
        step /= 10;
        p += 1;
    }
    step
}

fn decimal_to_raw(value: Decimal, precision: u8) -> Result<i128, ValidationError> {
    if precision > MAX_PRECISION {
        return Err(ValidationError::PrecisionExceeded {
            precision,
            max: MAX_PRECISION,
        });
    }
    let rounded =
        value.round_dp_with_strategy(precision as u32, RoundingStrategy::MidpointAwayFromZero);
    let scaled = rounded * Decimal::from_i128_with_scale(FIXED_SCALAR, 0);
    scaled.to_i128().ok_or_else(|| ValidationError::Invalid {
        field: "value",
        reason: format!("{value} out of fixed-point range"),
    })
}

fn raw_to_decimal(raw: i128, precision: u8) -> Decimal {
    // Mantissas are always exact multiples of the precision step.
    Decimal::from_i128_with_scale(raw / precision_step(precision), precision as u32)
}

fn fraction_digits(s: &str) -> u8 {
    match s.split_once('.') {
        Some((_, frac)) => frac.len() as u8,
        None => 0,
    }
}

/// Signed fixed-point price.
///
/// Equality, ordering and hashing consider only the mantissa, so `1.0` and
/// `1.00` are the same price at different display precisions.
#[derive(Debug, Clone, Copy)]
pub struct Price {
    raw: i64,
    precision: u8,
}

impl Price {
    /// Create a new price from a decimal value, rounding to `precision`.
    ///
    /// # Panics
    /// Panics if `precision` exceeds [`MAX_PRECISION`] or the value is out of
    /// fixed-point range. Use [`Price::try_new`] for fallible construction.
    pub fn new(value: Decimal, precision: u8) -> Self {
        Self::try_new(value, precision).expect("invalid price")
    }

    /// Fallible counterpart of [`Price::new`].
    pub fn try_new(value: Decimal, precision: u8) -> Result<Self, ValidationError> {
        let raw = decimal_to_raw(value, precision)?;
        let raw = i64::try_from(raw).map_err(|_| ValidationError::Invalid {
            field: "price",
            reason: format!("{value} out of range"),
        })?;
        Ok(Self { raw, precision })
    }

    /// Create from a raw 10^9-scaled mantissa. Bit-exact by construction.
    pub fn from_raw(raw: i64, precision: u8) -> Self {
        assert!(precision <= MAX_PRECISION, "precision exceeds maximum");
        Self { raw, precision }
    }

    /// The raw 10^9-scaled mantissa.
    pub fn raw(&self) -> i64 {
        self.raw
    }

    /// Display precision (0..=9).
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Exact decimal value at this price's precision.
    pub fn as_decimal(&self) -> Decimal {
        raw_to_decimal(self.raw as i128, self.precision)
    }

    /// Lossy conversion for reporting only; never used on the matching path.
    pub fn as_f64(&self) -> f64 {
        self.raw as f64 / FIXED_SCALAR as f64
    }

    /// Whether the mantissa is zero.
    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    /// Whether the mantissa is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.raw > 0
    }
}

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Price {}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl Hash for Price {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            raw: self.raw + rhs.raw,
            precision: self.precision.max(rhs.precision),
        }
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            raw: self.raw - rhs.raw,
            precision: self.precision.max(rhs.precision),
        }
    }
}

impl Mul<i64> for Price {
    type Output = Self;

    fn mul(self, scalar: i64) -> Self::Output {
        Self {
            raw: self.raw * scalar,
            precision: self.precision,
        }
    }
}

impl Div<i64> for Price {
    type Output = Self;

    fn div(self, scalar: i64) -> Self::Output {
        assert!(scalar != 0, "division by zero");
        Self {
            raw: self.raw / scalar,
            precision: self.precision,
        }
    }
}

impl FromStr for Price {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let precision = fraction_digits(s);
        let value = Decimal::from_str(s).map_err(|e| ValidationError::Invalid {
            field: "price",
            reason: e.to_string(),
        })?;
        Self::try_new(value, precision)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_decimal())
    }
}

impl Serialize for Price {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Unsigned fixed-point quantity.
///
/// Subtraction below zero is a forbidden state and panics.
#[derive(Debug, Clone, Copy)]
pub struct Quantity {
    raw: u64,
    precision: u8,
}

impl Quantity {
    /// Create a new quantity from a decimal value, rounding to `precision`.
    ///
    /// # Panics
    /// Panics if the value is negative, out of range, or `precision` exceeds
    /// [`MAX_PRECISION`]. Use [`Quantity::try_new`] for fallible construction.
    pub fn new(value: Decimal, precision: u8) -> Self {
        Self::try_new(value, precision).expect("invalid quantity")
    }

    /// Fallible counterpart of [`Quantity::new`].
    pub fn try_new(value: Decimal, precision: u8) -> Result<Self, ValidationError> {
        let raw = decimal_to_raw(value, precision)?;
        let raw = u64::try_from(raw).map_err(|_| ValidationError::Invalid {
            field: "quantity",
            reason: format!("{value} is negative or out of range"),
        })?;
        Ok(Self { raw, precision })
    }

    /// Create from a raw 10^9-scaled mantissa. Bit-exact by construction.
    pub fn from_raw(raw: u64, precision: u8) -> Self {
        assert!(precision <= MAX_PRECISION, "precision exceeds maximum");
        Self { raw, precision }
    }

    /// Zero quantity at the given precision.
    pub fn zero(precision: u8) -> Self {
        Self::from_raw(0, precision)
    }

    /// The raw 10^9-scaled mantissa.
    pub fn raw(&self) -> u64 {
        self.raw
    }

    /// Display precision (0..=9).
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Exact decimal value at this quantity's precision.
    pub fn as_decimal(&self) -> Decimal {
        raw_to_decimal(self.raw as i128, self.precision)
    }

    /// Lossy conversion for reporting only.
    pub fn as_f64(&self) -> f64 {
        self.raw as f64 / FIXED_SCALAR as f64
    }

    /// Whether the quantity is zero.
    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    /// The smaller of two quantities.
    pub fn min(self, other: Self) -> Self {
        if self.raw <= other.raw {
            self
        } else {
            other
        }
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl Hash for Quantity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl Add for Quantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            raw: self.raw + rhs.raw,
            precision: self.precision.max(rhs.precision),
        }
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Quantity {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        assert!(
            self.raw >= rhs.raw,
            "quantity subtraction would be negative"
        );
        Self {
            raw: self.raw - rhs.raw,
            precision: self.precision.max(rhs.precision),
        }
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul<Price> for Quantity {
    type Output = Decimal;

    fn mul(self, rhs: Price) -> Self::Output {
        self.as_decimal() * rhs.as_decimal()
    }
}

impl FromStr for Quantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let precision = fraction_digits(s);
        let value = Decimal::from_str(s).map_err(|e| ValidationError::Invalid {
            field: "quantity",
            reason: e.to_string(),
        })?;
        Self::try_new(value, precision)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_decimal())
    }
}

impl Serialize for Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
