use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tickforge::guards::{EntryGuard, GuardContext, GuardDecision};
use tickforge::ids::ConditionId;
use tickforge::market::MarketSide;

/// Allows every check but counts how many times it was consulted, so a
/// test can prove a later guard in the pipeline was never reached.
pub struct CounterSpy(pub Arc<AtomicUsize>);

impl EntryGuard for CounterSpy {
    fn name(&self) -> &str {
        "CounterSpy"
    }

    fn check(&self, _ctx: &GuardContext) -> GuardDecision {
        self.0.fetch_add(1, Ordering::SeqCst);
        GuardDecision::Allow
    }
}

/// A [`GuardContext`] with sane defaults for `condition_id: c1`; tests
/// override only the fields the scenario cares about.
pub fn guard_ctx() -> GuardContext {
    use std::str::FromStr;
    use tickforge::decimal::Decimal;

    GuardContext {
        condition_id: ConditionId::new("c1"),
        side: MarketSide::Yes,
        now_ms: 0,
        spread_pct: Decimal::zero(),
        open_position_count: 0,
        available_balance: Decimal::from_str("1000").unwrap(),
        total_exposure: Decimal::zero(),
        last_trade_time_ms: None,
        has_pending_order: false,
        book_age_ms: None,
        oracle_price: Decimal::from_str("0.5").unwrap(),
        best_ask: Decimal::from_str("0.5").unwrap(),
        recent_order_count: 0,
        per_market_order_count: 0,
        daily_pnl: Decimal::zero(),
    }
}
