//! Entry guard pipeline.
//!
//! Spec §4.8: an ordered list of [`EntryGuard`]s evaluated short-circuit —
//! the first to block wins and nothing after it is consulted. Grounded on
//! the teacher's `core/service/risk.rs` guard chain, generalized to a
//! pluggable trait with the spec's 14 canonical guards.

mod canonical;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use canonical::{
    Balance, BookStaleness, CircuitBreaker, Cooldown, DuplicateOrder, Exposure, KillSwitch,
    KillSwitchMode, MaxPositions, MaxSpread, MinEdge, PerMarketLimit, PortfolioRisk, RateLimit,
    Toxicity, UsdcRejection,
};

use crate::decimal::Decimal;
use crate::ids::ConditionId;
use crate::market::MarketSide;

/// The narrow context a guard is evaluated against. Built fresh per guard
/// check from the orchestrator's tick state; guards read only what they
/// need from it.
#[derive(Debug, Clone)]
pub struct GuardContext {
    pub condition_id: ConditionId,
    pub side: MarketSide,
    pub now_ms: i64,
    pub spread_pct: Decimal,
    pub open_position_count: usize,
    pub available_balance: Decimal,
    pub total_exposure: Decimal,
    pub last_trade_time_ms: Option<i64>,
    pub has_pending_order: bool,
    pub book_age_ms: Option<i64>,
    pub oracle_price: Decimal,
    pub best_ask: Decimal,
    pub recent_order_count: usize,
    pub per_market_order_count: usize,
    pub daily_pnl: Decimal,
}

/// The outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GuardDecision {
    Allow,
    Block {
        guard_name: String,
        reason: String,
        recoverable: bool,
        current_value: Option<String>,
        threshold: Option<String>,
    },
}

impl GuardDecision {
    #[must_use]
    pub fn block(
        guard_name: impl Into<String>,
        reason: impl Into<String>,
        recoverable: bool,
    ) -> Self {
        Self::Block {
            guard_name: guard_name.into(),
            reason: reason.into(),
            recoverable,
            current_value: None,
            threshold: None,
        }
    }

    #[must_use]
    pub fn block_with_values(
        guard_name: impl Into<String>,
        reason: impl Into<String>,
        recoverable: bool,
        current_value: impl Into<String>,
        threshold: impl Into<String>,
    ) -> Self {
        Self::Block {
            guard_name: guard_name.into(),
            reason: reason.into(),
            recoverable,
            current_value: Some(current_value.into()),
            threshold: Some(threshold.into()),
        }
    }

    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// A pluggable predicate over entry intents. Guard evaluation errors are
/// never surfaced as `Result::Err` here — the orchestrator converts them
/// to a blocking decision with reason `"guard error"` (spec §7) before
/// handing control to the pipeline; the trait itself is infallible.
pub trait EntryGuard: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, ctx: &GuardContext) -> GuardDecision;
}

/// An ordered, immutable chain of guards evaluated short-circuit.
#[derive(Clone, Default)]
pub struct GuardPipeline {
    guards: Arc<Vec<Arc<dyn EntryGuard>>>,
}

impl GuardPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self { guards: Arc::new(Vec::new()) }
    }

    /// Returns a new pipeline with `guard` appended; the receiver is
    /// unchanged.
    #[must_use]
    pub fn with(&self, guard: Arc<dyn EntryGuard>) -> Self {
        let mut guards = (*self.guards).clone();
        guards.push(guard);
        Self { guards: Arc::new(guards) }
    }

    #[must_use]
    pub fn guard_names(&self) -> Vec<String> {
        self.guards.iter().map(|g| g.name().to_string()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// The subset of this pipeline exits must still respect: `DuplicateOrder`
    /// and `BookStaleness`, preserving their relative order. Every other
    /// guard is entry-only and exits bypass it (spec §4.14, §9 Open
    /// Questions).
    #[must_use]
    pub fn exit_scoped(&self) -> Self {
        const EXIT_SAFE: [&str; 2] = ["DuplicateOrder", "BookStaleness"];
        let guards: Vec<Arc<dyn EntryGuard>> =
            self.guards.iter().filter(|g| EXIT_SAFE.contains(&g.name())).cloned().collect();
        Self { guards: Arc::new(guards) }
    }

    /// Fails if any name in `required` is absent from this pipeline.
    pub fn require_guards(&self, required: &[&str]) -> Result<(), String> {
        let names = self.guard_names();
        let missing: Vec<&str> =
            required.iter().filter(|r| !names.iter().any(|n| n == *r)).copied().collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("guard pipeline missing required guards: {}", missing.join(", ")))
        }
    }

    /// Evaluate the pipeline, stopping at the first `Block`.
    #[must_use]
    pub fn evaluate(&self, ctx: &GuardContext) -> GuardDecision {
        for guard in self.guards.iter() {
            let decision = guard.check(ctx);
            if !decision.is_allow() {
                return decision;
            }
        }
        GuardDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::str::FromStr;

    struct AlwaysBlock;
    impl EntryGuard for AlwaysBlock {
        fn name(&self) -> &str {
            "AlwaysBlock"
        }
        fn check(&self, _ctx: &GuardContext) -> GuardDecision {
            GuardDecision::block("AlwaysBlock", "nope", true)
        }
    }

    struct CounterSpy(Arc<AtomicUsize>);
    impl EntryGuard for CounterSpy {
        fn name(&self) -> &str {
            "CounterSpy"
        }
        fn check(&self, _ctx: &GuardContext) -> GuardDecision {
            self.0.fetch_add(1, Ordering::SeqCst);
            GuardDecision::Allow
        }
    }

    fn ctx() -> GuardContext {
        GuardContext {
            condition_id: ConditionId::new("c1"),
            side: MarketSide::Yes,
            now_ms: 0,
            spread_pct: Decimal::from_str("0.01").unwrap(),
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

    #[test]
    fn empty_pipeline_allows() {
        let pipeline = GuardPipeline::new();
        assert!(pipeline.evaluate(&ctx()).is_allow());
    }

    #[test]
    fn short_circuits_on_first_block() {
        let spy_calls = Arc::new(AtomicUsize::new(0));
        let pipeline = GuardPipeline::new()
            .with(Arc::new(AlwaysBlock))
            .with(Arc::new(CounterSpy(Arc::clone(&spy_calls))));
        let decision = pipeline.evaluate(&ctx());
        assert!(!decision.is_allow());
        assert_eq!(spy_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn with_does_not_mutate_receiver() {
        let base = GuardPipeline::new();
        let extended = base.with(Arc::new(AlwaysBlock));
        assert_eq!(base.len(), 0);
        assert_eq!(extended.len(), 1);
    }

    #[test]
    fn require_guards_detects_missing() {
        let pipeline = GuardPipeline::new().with(Arc::new(AlwaysBlock));
        assert!(pipeline.require_guards(&["AlwaysBlock"]).is_ok());
        assert!(pipeline.require_guards(&["MaxSpread"]).is_err());
    }

    #[test]
    fn exit_scoped_keeps_only_duplicate_order_and_book_staleness() {
        let pipeline = GuardPipeline::new()
            .with(Arc::new(MaxSpread { max_spread_pct: Decimal::from_str("0.01").unwrap() }))
            .with(Arc::new(DuplicateOrder))
            .with(Arc::new(BookStaleness { max_ms: 1_000 }))
            .with(Arc::new(AlwaysBlock));
        let scoped = pipeline.exit_scoped();
        assert_eq!(scoped.guard_names(), vec!["DuplicateOrder", "BookStaleness"]);
    }
}
