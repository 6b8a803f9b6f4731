//! Pluggable entry signal detection.
//!
//! Spec §4.10: detectors see a narrow read-only view of market state and
//! never touch positions, the registry, or guards — those stay the
//! orchestrator's concern. Grounded on the teacher's `core/service/signal.rs`
//! strategy-signal trait.

use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::error::TradingError;
use crate::ids::{ConditionId, MarketTokenId};
use crate::market::MarketSide;

/// The narrow view a detector is evaluated against.
#[derive(Debug, Clone)]
pub struct DetectionContext {
    pub condition_id: ConditionId,
    pub now_ms: i64,
    pub oracle_price: Decimal,
    pub spot: Decimal,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub time_remaining_ms: i64,
}

impl DetectionContext {
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.best_ask.sub(&self.best_bid)
    }

    #[must_use]
    pub fn spread_pct(&self) -> Decimal {
        let midpoint = self.best_bid.add(&self.best_ask).div(&Decimal::from_i64(2));
        match midpoint {
            Ok(mid) if !mid.is_zero() => self.spread().div(&mid).unwrap_or_else(|_| Decimal::zero()),
            _ => Decimal::zero(),
        }
    }
}

/// A detected opportunity, opaque to the orchestrator beyond being handed
/// back to [`SignalDetector::to_order`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub condition_id: ConditionId,
    pub token_id: MarketTokenId,
    pub side: MarketSide,
    pub edge: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Buy,
    Sell,
}

/// An entry or exit order request. Construction validates `0 <= price <= 1`
/// and `size > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub condition_id: ConditionId,
    pub token_id: MarketTokenId,
    pub side: MarketSide,
    pub direction: OrderDirection,
    pub price: Decimal,
    pub size: Decimal,
}

impl OrderIntent {
    pub fn try_new(
        condition_id: ConditionId,
        token_id: MarketTokenId,
        side: MarketSide,
        direction: OrderDirection,
        price: Decimal,
        size: Decimal,
    ) -> Result<Self, TradingError> {
        if price.is_negative() || price.gt(&Decimal::one()) {
            return Err(TradingError::order_rejected(format!(
                "order price {price} must satisfy 0 <= price <= 1"
            )));
        }
        if !size.is_positive() {
            return Err(TradingError::order_rejected("order size must be > 0"));
        }
        Ok(Self { condition_id, token_id, side, direction, price, size })
    }
}

pub trait SignalDetector: Send + Sync {
    fn detect_entry(&self, ctx: &DetectionContext) -> Option<Signal>;
    fn to_order(&self, signal: &Signal, ctx: &DetectionContext) -> Result<OrderIntent, TradingError>;
}

/// A detector that fires whenever the absolute edge `|oracle - bestAsk| /
/// bestAsk` meets a configured minimum, buying the side the oracle favors.
pub struct EdgeThresholdDetector {
    pub min_edge: Decimal,
    pub order_size: Decimal,
    pub token_id: MarketTokenId,
}

impl SignalDetector for EdgeThresholdDetector {
    fn detect_entry(&self, ctx: &DetectionContext) -> Option<Signal> {
        if ctx.best_ask.is_zero() {
            return None;
        }
        let edge = ctx.oracle_price.sub(&ctx.best_ask).abs().div(&ctx.best_ask).ok()?;
        if edge.lt(&self.min_edge) {
            return None;
        }
        let side = if ctx.oracle_price.gte(&ctx.best_ask) { MarketSide::Yes } else { MarketSide::No };
        Some(Signal {
            condition_id: ctx.condition_id.clone(),
            token_id: self.token_id.clone(),
            side,
            edge,
        })
    }

    fn to_order(&self, signal: &Signal, ctx: &DetectionContext) -> Result<OrderIntent, TradingError> {
        OrderIntent::try_new(
            signal.condition_id.clone(),
            signal.token_id.clone(),
            signal.side,
            OrderDirection::Buy,
            ctx.best_ask.clone(),
            self.order_size.clone(),
        )
    }
}
