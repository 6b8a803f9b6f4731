//! Market-side and candle primitives.

use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::error::TradingError;

/// A binary market side. `complement(Yes) = No` and, on price,
/// `complement(p) = 1 - p` (clamped to `[0, 1]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketSide {
    Yes,
    No,
}

impl MarketSide {
    #[must_use]
    pub fn complement(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }

    /// Complement a price: `1 - p`, clamped to `[0, 1]`.
    #[must_use]
    pub fn complement_price(price: &Decimal) -> Decimal {
        Decimal::one().sub(price).clamp_unit()
    }
}

/// An OHLCV candle. Construction validates `low <= open,close <= high`,
/// `volume >= 0`, `timestamp_ms >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp_ms: i64,
}

impl Candle {
    pub fn try_new(
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        timestamp_ms: i64,
    ) -> Result<Self, TradingError> {
        if low.gt(&open) || low.gt(&close) || open.gt(&high) || close.gt(&high) {
            return Err(TradingError::invalid_candle(format!(
                "candle must satisfy low <= open,close <= high (open={open}, high={high}, low={low}, close={close})"
            )));
        }
        if volume.is_negative() {
            return Err(TradingError::invalid_candle("volume must be >= 0"));
        }
        if timestamp_ms < 0 {
            return Err(TradingError::invalid_candle("timestamp_ms must be >= 0"));
        }
        Ok(Self { open, high, low, close, volume, timestamp_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn complement_flips_side() {
        assert_eq!(MarketSide::Yes.complement(), MarketSide::No);
        assert_eq!(MarketSide::No.complement(), MarketSide::Yes);
    }

    #[test]
    fn complement_price_subtracts_from_one() {
        let p = d("0.3");
        assert!(MarketSide::complement_price(&p).eq_to(&d("0.7")));
    }

    #[test]
    fn complement_price_clamps() {
        let p = d("1.5");
        assert!(MarketSide::complement_price(&p).eq_to(&Decimal::zero()));
    }

    #[test]
    fn valid_candle_constructs() {
        let c = Candle::try_new(d("1"), d("2"), d("0.5"), d("1.5"), d("10"), 1000);
        assert!(c.is_ok());
    }

    #[test]
    fn candle_rejects_low_above_open() {
        let c = Candle::try_new(d("1"), d("2"), d("1.5"), d("1.5"), d("10"), 1000);
        assert!(c.is_err());
    }

    #[test]
    fn candle_rejects_negative_volume() {
        let c = Candle::try_new(d("1"), d("2"), d("0.5"), d("1.5"), d("-1"), 1000);
        assert!(c.is_err());
    }

    #[test]
    fn candle_rejects_negative_timestamp() {
        let c = Candle::try_new(d("1"), d("2"), d("0.5"), d("1.5"), d("10"), -1);
        assert!(c.is_err());
    }

    #[test]
    fn candle_roundtrips_through_json() {
        let c = Candle::try_new(d("1"), d("2"), d("0.5"), d("1.5"), d("10"), 1000).unwrap();
        let json = serde_json::to_string(&c).unwrap();
        let back: Candle = serde_json::from_str(&json).unwrap();
        assert_eq!(c, back);
    }
}
