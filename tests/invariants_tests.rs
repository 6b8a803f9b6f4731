//! Property-based tests for the universal invariants: arbitrary-precision
//! decimal arithmetic laws, candle construction, the lifecycle state
//! machine's terminal/halted behavior, guard pipeline short-circuiting, and
//! position manager accounting. Grounded on the `proptest` style used
//! elsewhere in the retrieved pack for fixed-point arithmetic invariants.

mod support;

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use tickforge::decimal::Decimal;
use tickforge::guards::{EntryGuard, GuardContext, GuardDecision, GuardPipeline};
use tickforge::ids::MarketTokenId;
use tickforge::lifecycle::{LifecycleEvent, StrategyLifecycle};
use tickforge::market::{Candle, MarketSide};
use tickforge::position::PositionManager;

use support::scenario::guard_ctx;

fn cents(v: i32) -> Decimal {
    let sign = if v < 0 { "-" } else { "" };
    let abs = v.unsigned_abs();
    Decimal::from_str(&format!("{sign}{}.{:02}", abs / 100, abs % 100)).unwrap()
}

proptest! {
    #[test]
    fn decimal_addition_commutes(a in -100_000i32..100_000, b in -100_000i32..100_000) {
        let (da, db) = (cents(a), cents(b));
        prop_assert!(da.add(&db).eq_to(&db.add(&da)));
    }

    #[test]
    fn decimal_mul_div_round_trips(a in -10_000i32..10_000, b in 1i32..10_000) {
        let (da, db) = (cents(a), cents(b));
        let product = da.mul(&db);
        let back = product.div(&db).unwrap();
        prop_assert!(back.eq_to(&da));
    }

    #[test]
    fn decimal_division_by_zero_always_fails(a in -10_000i32..10_000) {
        prop_assert!(cents(a).div(&Decimal::zero()).is_err());
    }

    #[test]
    fn candle_construction_accepts_valid_bounds_and_round_trips(
        low in 0i32..10_000,
        open_offset in 0i32..5_000,
        close_offset in 0i32..5_000,
        high_offset in 0i32..5_000,
        volume in 0i32..100_000,
        timestamp_ms in 0i64..10_000_000_000,
    ) {
        let low_d = cents(low);
        let open_d = cents(low + open_offset);
        let close_d = cents(low + close_offset);
        let high_d = cents(low + open_offset.max(close_offset) + high_offset);
        let volume_d = cents(volume);

        let candle = Candle::try_new(open_d, high_d, low_d, close_d, volume_d, timestamp_ms).unwrap();
        let json = serde_json::to_string(&candle).unwrap();
        let back: Candle = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(candle, back);
    }

    #[test]
    fn candle_construction_rejects_low_above_open_or_close(
        open in 0i32..10_000,
        close in 0i32..10_000,
        low_excess in 1i32..5_000,
    ) {
        let low = open.max(close) + low_excess;
        let result = Candle::try_new(cents(open), cents(low + 1_000), cents(low), cents(close), cents(0), 0);
        prop_assert!(result.is_err());
    }

    #[test]
    fn lifecycle_never_leaves_shutdown(events in proptest::collection::vec(0u8..7, 0..20)) {
        let mut fsm = StrategyLifecycle::new(0);
        fsm.apply(LifecycleEvent::Initialize, 0).ok();
        fsm.apply(LifecycleEvent::WarmupComplete, 0).ok();
        fsm.apply(LifecycleEvent::Shutdown, 0).unwrap();

        for tag in events {
            let event = tagged_event(tag);
            let result = fsm.apply(event, 0);
            prop_assert!(result.is_err());
            prop_assert_eq!(fsm.state(), tickforge::lifecycle::StrategyState::Shutdown);
        }
    }

    #[test]
    fn resume_from_halted_always_fails_regardless_of_prior_events(
        events in proptest::collection::vec(0u8..7, 0..10),
    ) {
        let mut fsm = StrategyLifecycle::new(0);
        fsm.apply(LifecycleEvent::Initialize, 0).ok();
        fsm.apply(LifecycleEvent::WarmupComplete, 0).ok();
        fsm.apply(LifecycleEvent::Halt { reason: "test".into() }, 0).ok();

        for tag in events {
            let _ = fsm.apply(tagged_event(tag), 0);
        }
        if fsm.state() == tickforge::lifecycle::StrategyState::Halted {
            prop_assert!(fsm.apply(LifecycleEvent::Resume, 0).is_err());
        }
    }

    #[test]
    fn lifecycle_history_never_exceeds_capacity(events in proptest::collection::vec(0u8..7, 0..250)) {
        let mut fsm = StrategyLifecycle::new(0);
        fsm.apply(LifecycleEvent::Initialize, 0).ok();
        fsm.apply(LifecycleEvent::WarmupComplete, 0).ok();
        for tag in events {
            let _ = fsm.apply(tagged_event(tag), 0);
        }
        prop_assert!(fsm.history().len() <= tickforge::lifecycle::HISTORY_CAPACITY);
    }

    #[test]
    fn guard_pipeline_reports_the_first_blocker(pattern in proptest::collection::vec(any::<bool>(), 1..8)) {
        let call_counts: Vec<Arc<AtomicUsize>> = pattern.iter().map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let expected_blocker = pattern.iter().position(|&blocks| blocks);

        let mut pipeline = GuardPipeline::new();
        for (i, &blocks) in pattern.iter().enumerate() {
            pipeline = pipeline.with(Arc::new(ScriptedGuard {
                name: format!("guard-{i}"),
                blocks,
                calls: Arc::clone(&call_counts[i]),
            }));
        }

        let decision = pipeline.evaluate(&guard_ctx());
        match expected_blocker {
            Some(idx) => {
                match decision {
                    GuardDecision::Block { guard_name, .. } => prop_assert_eq!(guard_name, format!("guard-{idx}")),
                    GuardDecision::Allow => prop_assert!(false, "expected a block"),
                }
                for count in call_counts.iter().skip(idx + 1) {
                    prop_assert_eq!(count.load(Ordering::SeqCst), 0);
                }
            }
            None => prop_assert!(decision.is_allow()),
        }
    }

    #[test]
    fn position_manager_close_clears_position_and_sums_realized_pnl(
        entry in 100i32..9_000,
        size in 1i32..1_000,
        exits in proptest::collection::vec(-5_000i32..5_000, 1..5),
    ) {
        let token_id = MarketTokenId::new("tok-prop");
        let mut manager = PositionManager::new();
        manager.open(token_id.clone(), MarketSide::Yes, cents(size), cents(entry), 0);

        let mut expected_total = Decimal::zero();
        let per_exit_size = cents(size).div(&Decimal::from_i64(exits.len() as i64)).unwrap();
        for exit in &exits {
            let exit_price = cents(entry + exit);
            if let Some(pnl) = manager.reduce(&token_id, &per_exit_size, &exit_price, 0) {
                expected_total = expected_total.add(&pnl);
            }
        }
        // Close whatever remains so `hasPosition` is guaranteed false afterward.
        if let Some(pnl) = manager.close(&token_id, &cents(entry), 0) {
            expected_total = expected_total.add(&pnl);
        }

        prop_assert!(manager.get(&token_id).is_none());
        prop_assert!(manager.realized_pnl_total().eq_to(&expected_total));
    }
}

fn tagged_event(tag: u8) -> LifecycleEvent {
    match tag {
        0 => LifecycleEvent::Initialize,
        1 => LifecycleEvent::UpdateWarmup { pct: 50 },
        2 => LifecycleEvent::WarmupComplete,
        3 => LifecycleEvent::Pause { reason: "prop".into() },
        4 => LifecycleEvent::Resume,
        5 => LifecycleEvent::EnterClosingOnly,
        _ => LifecycleEvent::Halt { reason: "prop".into() },
    }
}

struct ScriptedGuard {
    name: String,
    blocks: bool,
    calls: Arc<AtomicUsize>,
}

impl EntryGuard for ScriptedGuard {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, _ctx: &GuardContext) -> GuardDecision {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.blocks {
            GuardDecision::block(self.name.clone(), "scripted block", true)
        } else {
            GuardDecision::Allow
        }
    }
}
