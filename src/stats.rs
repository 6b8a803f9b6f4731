//! Cumulative trade statistics.
//!
//! Spec §4.14: subscribes to `position_closed` domain events and maintains
//! trade count, win rate, best/worst trade, total fees, and max drawdown on
//! net equity (`totalPnl - totalFees`). A `position_closed` payload with a
//! non-finite `pnl`/`fee`, or a negative `fee`, is ignored here (it is
//! still journaled upstream by the orchestrator). Grounded on the
//! teacher's `core/service/stats.rs` accumulator subscribed the same way.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decimal::Decimal;
use crate::events::{EventDispatcher, EventNamespace};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosedPayload {
    pub pnl: f64,
    pub fee: f64,
}

#[derive(Debug, Clone)]
struct StatsState {
    trade_count: u64,
    win_count: u64,
    total_pnl: Decimal,
    total_fees: Decimal,
    best_trade: Option<Decimal>,
    worst_trade: Option<Decimal>,
    net_equity_peak: Decimal,
    max_drawdown: Decimal,
}

impl Default for StatsState {
    fn default() -> Self {
        Self {
            trade_count: 0,
            win_count: 0,
            total_pnl: Decimal::zero(),
            total_fees: Decimal::zero(),
            best_trade: None,
            worst_trade: None,
            net_equity_peak: Decimal::zero(),
            max_drawdown: Decimal::zero(),
        }
    }
}

/// A snapshot of the accumulated statistics.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub trade_count: u64,
    pub win_rate: f64,
    pub best_trade: Option<Decimal>,
    pub worst_trade: Option<Decimal>,
    pub total_fees: Decimal,
    pub max_drawdown: Decimal,
}

/// Accumulates trade statistics from `position_closed` events. Subscribe
/// it to an [`EventDispatcher`] with [`StatsAccumulator::subscribe`].
#[derive(Default)]
pub struct StatsAccumulator {
    state: Mutex<StatsState>,
}

impl StatsAccumulator {
    #[must_use]
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    pub fn subscribe(self: &std::sync::Arc<Self>, dispatcher: &EventDispatcher) {
        let this = std::sync::Arc::clone(self);
        dispatcher.subscribe(EventNamespace::Domain, "position_closed", move |_, payload: &Value| {
            this.on_position_closed(payload);
        });
    }

    fn on_position_closed(&self, payload: &Value) {
        let Ok(parsed) = serde_json::from_value::<PositionClosedPayload>(payload.clone()) else {
            return;
        };
        if !parsed.pnl.is_finite() || !parsed.fee.is_finite() || parsed.fee < 0.0 {
            return;
        }
        self.record(parsed.pnl, parsed.fee);
    }

    fn record(&self, pnl: f64, fee: f64) {
        let pnl_dec = Decimal::from_f64_lossy(pnl);
        let fee_dec = Decimal::from_f64_lossy(fee);

        let mut state = self.state.lock();
        state.trade_count += 1;
        if pnl > 0.0 {
            state.win_count += 1;
        }
        state.total_pnl = state.total_pnl.add(&pnl_dec);
        state.total_fees = state.total_fees.add(&fee_dec);
        state.best_trade = Some(match &state.best_trade {
            Some(best) if best.gte(&pnl_dec) => best.clone(),
            _ => pnl_dec.clone(),
        });
        state.worst_trade = Some(match &state.worst_trade {
            Some(worst) if worst.lte(&pnl_dec) => worst.clone(),
            _ => pnl_dec.clone(),
        });

        let net_equity = state.total_pnl.sub(&state.total_fees);
        if net_equity.gt(&state.net_equity_peak) {
            state.net_equity_peak = net_equity.clone();
        }
        if state.net_equity_peak.is_positive() {
            if let Ok(drawdown) =
                state.net_equity_peak.sub(&net_equity).div(&state.net_equity_peak)
            {
                if drawdown.gt(&state.max_drawdown) {
                    state.max_drawdown = drawdown;
                }
            }
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let state = self.state.lock();
        let win_rate =
            if state.trade_count == 0 { 0.0 } else { state.win_count as f64 / state.trade_count as f64 };
        StatsSnapshot {
            trade_count: state.trade_count,
            win_rate,
            best_trade: state.best_trade.clone(),
            worst_trade: state.worst_trade.clone(),
            total_fees: state.total_fees.clone(),
            max_drawdown: state.max_drawdown.clone(),
        }
    }
}
