//! Canonical exit policies.

use parking_lot::Mutex;

use super::{ExitContext, ExitPolicy, ExitReason};
use crate::decimal::Decimal;
use crate::market::MarketSide;
use crate::position::OpenPosition;

/// `gain_pct(position, mark)`: the fractional gain on the position's side
/// at the given mark price, positive when favorable.
fn gain_pct(position: &OpenPosition, mark: &Decimal) -> Option<Decimal> {
    if position.average_entry_price.is_zero() {
        return None;
    }
    let raw = mark.sub(&position.average_entry_price).div(&position.average_entry_price).ok()?;
    Some(match position.side {
        MarketSide::Yes => raw,
        MarketSide::No => raw.neg(),
    })
}

pub struct TakeProfit {
    pub threshold_pct: Decimal,
}

impl ExitPolicy for TakeProfit {
    fn name(&self) -> &str {
        "TakeProfit"
    }
    fn evaluate(&self, position: &OpenPosition, ctx: &ExitContext) -> Option<ExitReason> {
        let gain = gain_pct(position, &ctx.best_bid)?;
        (gain.gte(&self.threshold_pct)).then_some(ExitReason::TakeProfit)
    }
}

pub struct StopLoss {
    pub threshold_pct: Decimal,
}

impl ExitPolicy for StopLoss {
    fn name(&self) -> &str {
        "StopLoss"
    }
    fn evaluate(&self, position: &OpenPosition, ctx: &ExitContext) -> Option<ExitReason> {
        let gain = gain_pct(position, &ctx.best_bid)?;
        (gain.lte(&self.threshold_pct.neg())).then_some(ExitReason::StopLoss)
    }
}

/// Exits once price retraces `drawdown_pct` from the position's recorded
/// high-water mark.
pub struct TrailingStop {
    pub drawdown_pct: Decimal,
}

impl ExitPolicy for TrailingStop {
    fn name(&self) -> &str {
        "TrailingStop"
    }
    fn evaluate(&self, position: &OpenPosition, ctx: &ExitContext) -> Option<ExitReason> {
        if position.high_water_mark.is_zero() {
            return None;
        }
        let retrace =
            position.high_water_mark.sub(&ctx.best_bid).div(&position.high_water_mark).ok()?;
        (retrace.gte(&self.drawdown_pct)).then_some(ExitReason::TrailingStop)
    }
}

pub struct TimeExit {
    pub max_hold_ms: i64,
}

impl ExitPolicy for TimeExit {
    fn name(&self) -> &str {
        "TimeExit"
    }
    fn evaluate(&self, position: &OpenPosition, ctx: &ExitContext) -> Option<ExitReason> {
        (ctx.now_ms - position.opened_at_ms >= self.max_hold_ms).then_some(ExitReason::TimeExit)
    }
}

/// Exits when the oracle's implied edge flips against the held side beyond
/// `reversal_threshold`.
pub struct EdgeReversal {
    pub reversal_threshold: Decimal,
}

impl ExitPolicy for EdgeReversal {
    fn name(&self) -> &str {
        "EdgeReversal"
    }
    fn evaluate(&self, position: &OpenPosition, ctx: &ExitContext) -> Option<ExitReason> {
        let oracle_edge = match position.side {
            MarketSide::Yes => ctx.oracle_price.sub(&position.average_entry_price),
            MarketSide::No => position.average_entry_price.sub(&ctx.oracle_price),
        };
        (oracle_edge.lte(&self.reversal_threshold.neg())).then_some(ExitReason::EdgeReversal)
    }
}

pub struct NearExpiry {
    pub min_time_remaining_ms: i64,
}

impl ExitPolicy for NearExpiry {
    fn name(&self) -> &str {
        "NearExpiry"
    }
    fn evaluate(&self, _position: &OpenPosition, ctx: &ExitContext) -> Option<ExitReason> {
        (ctx.time_remaining_ms <= self.min_time_remaining_ms).then_some(ExitReason::NearExpiry)
    }
}

/// Tracks a high-water mark over cumulative realized P&L across the whole
/// book and forces an exit on every open position once equity has drawn
/// down by `drawdown_fraction` from that peak. Only arms once the peak is
/// positive — a book that has never been profitable cannot trip.
pub struct ProfitLocker {
    pub drawdown_fraction: Decimal,
    peak: Mutex<Decimal>,
    current: Mutex<Decimal>,
}

impl ProfitLocker {
    #[must_use]
    pub fn new(drawdown_fraction: Decimal) -> Self {
        Self {
            drawdown_fraction,
            peak: Mutex::new(Decimal::zero()),
            current: Mutex::new(Decimal::zero()),
        }
    }

    /// Feed the latest cumulative realized P&L; call once per tick before
    /// evaluating the exit pipeline.
    pub fn record_cumulative_pnl(&self, cumulative_pnl: &Decimal) {
        let mut peak = self.peak.lock();
        if cumulative_pnl.gt(&peak) {
            *peak = cumulative_pnl.clone();
        }
        *self.current.lock() = cumulative_pnl.clone();
    }

    fn triggered(&self) -> bool {
        let peak = self.peak.lock();
        if !peak.is_positive() {
            return false;
        }
        let current = self.current.lock();
        let Ok(drawdown) = peak.sub(&current).div(&peak) else {
            return false;
        };
        drawdown.gte(&self.drawdown_fraction)
    }
}

impl ExitPolicy for ProfitLocker {
    fn name(&self) -> &str {
        "ProfitLocker"
    }
    fn evaluate(&self, _position: &OpenPosition, _ctx: &ExitContext) -> Option<ExitReason> {
        // ProfitLocker is armed externally via `record_cumulative_pnl`;
        // cumulative P&L is account-wide, not per-position, so `ctx` is
        // unused here.
        if self.triggered() {
            return Some(ExitReason::Emergency);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MarketTokenId;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn position() -> OpenPosition {
        OpenPosition {
            token_id: MarketTokenId::new("t1"),
            side: MarketSide::Yes,
            size: d("10"),
            average_entry_price: d("0.5"),
            opened_at_ms: 0,
            high_water_mark: d("0.5"),
        }
    }

    fn ctx() -> ExitContext {
        ExitContext {
            now_ms: 0,
            best_bid: d("0.5"),
            oracle_price: d("0.5"),
            time_remaining_ms: 100_000,
            spread_pct: d("0.01"),
        }
    }

    #[test]
    fn take_profit_fires_at_threshold() {
        let policy = TakeProfit { threshold_pct: d("0.10") };
        let mut c = ctx();
        c.best_bid = d("0.60");
        assert_eq!(policy.evaluate(&position(), &c), Some(ExitReason::TakeProfit));
    }

    #[test]
    fn stop_loss_fires_on_loss_side() {
        let policy = StopLoss { threshold_pct: d("0.10") };
        let mut c = ctx();
        c.best_bid = d("0.40");
        assert_eq!(policy.evaluate(&position(), &c), Some(ExitReason::StopLoss));
    }

    #[test]
    fn trailing_stop_fires_after_retrace_from_peak() {
        let policy = TrailingStop { drawdown_pct: d("0.10") };
        let mut pos = position();
        pos.high_water_mark = d("0.80");
        let mut c = ctx();
        c.best_bid = d("0.70");
        assert_eq!(policy.evaluate(&pos, &c), Some(ExitReason::TrailingStop));
    }

    #[test]
    fn time_exit_fires_after_max_hold() {
        let policy = TimeExit { max_hold_ms: 1_000 };
        let mut c = ctx();
        c.now_ms = 1_000;
        assert_eq!(policy.evaluate(&position(), &c), Some(ExitReason::TimeExit));
    }

    #[test]
    fn near_expiry_fires_when_time_remaining_low() {
        let policy = NearExpiry { min_time_remaining_ms: 5_000 };
        let mut c = ctx();
        c.time_remaining_ms = 4_000;
        assert_eq!(policy.evaluate(&position(), &c), Some(ExitReason::NearExpiry));
    }

    #[test]
    fn profit_locker_stays_disarmed_until_peak_positive() {
        let locker = ProfitLocker::new(d("0.5"));
        locker.record_cumulative_pnl(&d("-10"));
        assert_eq!(locker.evaluate(&position(), &ctx()), None);
    }

    #[test]
    fn profit_locker_fires_after_drawdown_from_positive_peak() {
        let locker = ProfitLocker::new(d("0.5"));
        locker.record_cumulative_pnl(&d("100"));
        locker.record_cumulative_pnl(&d("40"));
        assert_eq!(locker.evaluate(&position(), &ctx()), Some(ExitReason::Emergency));
    }
}
