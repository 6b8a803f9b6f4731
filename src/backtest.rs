//! Event-driven candle backtester.
//!
//! Spec §1: "a simple event-driven backtester is included only as a
//! collaborator of the same detector interface" — not an optimizer, not a
//! book-matching engine. Replays a candle series through the same
//! [`BuiltStrategy::tick`] path a live run uses, with a [`PaperExecutor`]
//! standing in for the exchange and zero modeled spread. Grounded on the
//! teacher's `backtest/` harness (if present) or, failing that, its
//! dry-run CLI path — generalized here to a candle-driven replay loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::FakeClock;
use crate::detector::SignalDetector;
use crate::error::Result;
use crate::events::EventDispatcher;
use crate::exits::ExitPipeline;
use crate::guards::GuardPipeline;
use crate::ids::{ConditionId, MarketTokenId};
use crate::journal::MemoryJournal;
use crate::market::{Candle, MarketSide};
use crate::paper::PaperExecutor;
use crate::position::ClosedPosition;
use crate::stats::StatsSnapshot;
use crate::tick::{BuiltStrategy, StrategyConfig, TickContext};

/// One row of the backtester's equity curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp_ms: i64,
    pub realized_pnl_total: f64,
}

/// The result of replaying a candle series.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub closed_positions: Vec<ClosedPosition>,
    pub equity_curve: Vec<EquityPoint>,
    pub stats: StatsSnapshot,
}

/// Replays a `Vec<Candle>` through a [`SignalDetector`] and [`ExitPipeline`]
/// using the live tick path, standing in a [`PaperExecutor`] and a
/// [`FakeClock`] driven by each candle's own timestamp.
pub struct Backtester {
    strategy: BuiltStrategy,
    clock: Arc<FakeClock>,
    available_balance: crate::decimal::Decimal,
}

impl Backtester {
    #[must_use]
    pub fn new(
        condition_id: ConditionId,
        token_id: MarketTokenId,
        side: MarketSide,
        detector: Arc<dyn SignalDetector>,
        entry_guards: GuardPipeline,
        exits: ExitPipeline,
        available_balance: crate::decimal::Decimal,
    ) -> Self {
        let clock = FakeClock::new(0);
        let config = StrategyConfig {
            condition_id,
            token_id,
            side,
            warmup_ticks: 0,
            watchdog_warning_ms: i64::MAX,
            watchdog_critical_ms: i64::MAX,
            order_rate_window_ms: 60_000,
        };
        let executor = Arc::new(PaperExecutor::new(Arc::clone(&clock) as Arc<dyn crate::clock::Clock>));
        let journal = Arc::new(MemoryJournal::new(Arc::clone(&clock) as Arc<dyn crate::clock::Clock>));
        let events = Arc::new(EventDispatcher::new());
        let stats = crate::stats::StatsAccumulator::new();
        let mut strategy = BuiltStrategy::new(
            config,
            Arc::clone(&clock) as Arc<dyn crate::clock::Clock>,
            detector,
            entry_guards,
            exits,
            executor,
            journal,
            events,
            stats,
        );
        let _ = strategy.apply_lifecycle_event(crate::lifecycle::LifecycleEvent::Initialize, 0);
        let _ = strategy.apply_lifecycle_event(crate::lifecycle::LifecycleEvent::WarmupComplete, 0);
        Self { strategy, clock, available_balance }
    }

    /// Replay every candle in order, advancing the clock to each candle's
    /// own `timestamp_ms` and deriving a zero-spread [`TickContext`] from
    /// its close price. `time_remaining_ms` counts down to the final
    /// candle's timestamp.
    pub async fn run(&mut self, candles: &[Candle]) -> Result<BacktestReport> {
        let mut equity_curve = Vec::with_capacity(candles.len());
        let last_ts = candles.last().map_or(0, |c| c.timestamp_ms);

        for candle in candles {
            self.clock.set(candle.timestamp_ms);
            let ctx = TickContext {
                now_ms: candle.timestamp_ms,
                oracle_price: candle.close.clone(),
                spot: candle.close.clone(),
                best_bid: candle.close.clone(),
                best_ask: candle.close.clone(),
                book_age_ms: Some(0),
                time_remaining_ms: (last_ts - candle.timestamp_ms).max(0),
                available_balance: self.available_balance.clone(),
                daily_pnl: self.strategy.positions().realized_pnl_total().clone(),
            };
            self.strategy.tick(&ctx).await?;
            equity_curve.push(EquityPoint {
                timestamp_ms: candle.timestamp_ms,
                realized_pnl_total: self.strategy.positions().realized_pnl_total().to_f64(),
            });
        }

        Ok(BacktestReport {
            closed_positions: self.strategy.positions().closed_positions(),
            equity_curve,
            stats: self.strategy.stats().snapshot(),
        })
    }
}
