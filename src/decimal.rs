//! Arbitrary-precision decimal arithmetic.
//!
//! Backed by [`bigdecimal::BigDecimal`], which has no fixed mantissa width —
//! the spec's 40-significant-digit floor is easily met and every basic
//! operation (`add`/`sub`/`mul`/`div`) is exact. Transcendental operations
//! (`sqrt`/`ln`/`exp`) fall back to `f64` math and round-trip through
//! `BigDecimal`, which is acceptable since the spec only requires exactness
//! for the basic arithmetic.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::error::TradingError;

/// An exact, arbitrary-precision signed decimal value.
///
/// Every operation returns a fresh `Decimal`; there is no in-place mutation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Decimal(BigDecimal);

impl Decimal {
    /// The additive identity.
    #[must_use]
    pub fn zero() -> Self {
        Self(BigDecimal::zero())
    }

    /// The multiplicative identity.
    #[must_use]
    pub fn one() -> Self {
        Self(BigDecimal::from(1))
    }

    /// Parse a decimal from its textual representation.
    ///
    /// Fails on non-finite, empty, or malformed input.
    pub fn from_str(s: &str) -> Result<Self, TradingError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TradingError::invalid_candle(format!(
                "cannot parse decimal from empty string"
            )));
        }
        if matches!(trimmed, "NaN" | "nan" | "Infinity" | "-Infinity" | "inf" | "-inf") {
            return Err(TradingError::invalid_candle(format!(
                "non-finite decimal literal: {trimmed}"
            )));
        }
        BigDecimal::from_str(trimmed)
            .map(Self)
            .map_err(|e| TradingError::invalid_candle(format!("invalid decimal `{trimmed}`: {e}")))
    }

    /// Construct from an integer.
    #[must_use]
    pub fn from_i64(v: i64) -> Self {
        Self(BigDecimal::from(v))
    }

    /// Lossy construction from `f64`, used only where the wire format is
    /// inherently floating-point (e.g. event payload statistics).
    #[must_use]
    pub fn from_f64_lossy(v: f64) -> Self {
        BigDecimal::from_f64(v).map(Self).unwrap_or_else(Self::zero)
    }

    /// Best-effort, lossy conversion to `f64`.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::NAN)
    }

    /// Render without trailing zeros or a dangling decimal point.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        let normalized = self.0.normalized();
        let s = normalized.to_string();
        if let Some(stripped) = s.strip_suffix(".0") {
            stripped.to_string()
        } else {
            s
        }
    }

    /// Render with exactly `n` fractional digits, half-up rounding.
    #[must_use]
    pub fn to_fixed(&self, n: i64) -> String {
        self.0.with_scale_round(n, bigdecimal::RoundingMode::HalfUp).to_string()
    }

    pub fn add(&self, other: &Self) -> Self {
        Self(&self.0 + &other.0)
    }

    pub fn sub(&self, other: &Self) -> Self {
        Self(&self.0 - &other.0)
    }

    pub fn mul(&self, other: &Self) -> Self {
        Self(&self.0 * &other.0)
    }

    pub fn div(&self, other: &Self) -> Result<Self, TradingError> {
        if other.is_zero() {
            return Err(TradingError::div_by_zero());
        }
        Ok(Self(&self.0 / &other.0))
    }

    #[must_use]
    pub fn neg(&self) -> Self {
        Self(-&self.0)
    }

    #[must_use]
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    #[must_use]
    pub fn cmp_to(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }

    #[must_use]
    pub fn gt(&self, other: &Self) -> bool {
        self.0 > other.0
    }

    #[must_use]
    pub fn gte(&self, other: &Self) -> bool {
        self.0 >= other.0
    }

    #[must_use]
    pub fn lt(&self, other: &Self) -> bool {
        self.0 < other.0
    }

    #[must_use]
    pub fn lte(&self, other: &Self) -> bool {
        self.0 <= other.0
    }

    #[must_use]
    pub fn eq_to(&self, other: &Self) -> bool {
        self.0 == other.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0 > BigDecimal::zero()
    }

    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0 < BigDecimal::zero()
    }

    /// Square root. Fails on negative operands.
    pub fn sqrt(&self) -> Result<Self, TradingError> {
        if self.is_negative() {
            return Err(TradingError::invalid_candle(
                "sqrt of a negative decimal is undefined",
            ));
        }
        self.0
            .sqrt()
            .map(Self)
            .ok_or_else(|| TradingError::invalid_candle("sqrt failed to converge"))
    }

    /// Natural logarithm. Fails on non-positive operands.
    pub fn ln(&self) -> Result<Self, TradingError> {
        if !self.is_positive() {
            return Err(TradingError::invalid_candle(
                "ln is only defined for positive decimals",
            ));
        }
        let f = self.to_f64();
        BigDecimal::from_f64(f.ln())
            .map(Self)
            .ok_or_else(|| TradingError::invalid_candle("ln produced a non-finite result"))
    }

    /// `e^self`, via `f64` fallback.
    #[must_use]
    pub fn exp(&self) -> Self {
        let f = self.to_f64();
        BigDecimal::from_f64(f.exp())
            .map(Self)
            .unwrap_or_else(Self::zero)
    }

    /// Integer power, computed exactly via repeated multiplication.
    #[must_use]
    pub fn pow(&self, n: u32) -> Self {
        let mut acc = BigDecimal::from(1);
        for _ in 0..n {
            acc = &acc * &self.0;
        }
        Self(acc)
    }

    /// Clamp to the closed interval `[0, 1]`, used for probability-shaped
    /// values like market prices.
    #[must_use]
    pub fn clamp_unit(&self) -> Self {
        if self.0 < BigDecimal::zero() {
            Self::zero()
        } else if self.0 > BigDecimal::from(1) {
            Self::one()
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl TryFrom<String> for Decimal {
    type Error = TradingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl From<Decimal> for String {
    fn from(value: Decimal) -> Self {
        value.to_display_string()
    }
}

/// Construct a [`Decimal`] from an integer or float literal at compile time,
/// panicking on malformed input. Reserved for tests and constants — this is
/// the crate's equivalent of `rust_decimal_macros::dec!`.
#[macro_export]
macro_rules! dec {
    ($lit:expr) => {
        $crate::decimal::Decimal::from_str(&stringify!($lit).replace(' ', ""))
            .expect("invalid decimal literal")
    };
}
