//! The tick orchestrator — fuses every other module into one operation.
//!
//! Spec §4.14: given a [`TickContext`], `BuiltStrategy::tick` runs the
//! watchdog touch, warmup advance, exit phase, entry phase, and event/
//! journal emission in the order the spec lays out. Grounded on the
//! teacher's `app/orchestrator/{mod,builder,execution,handler}.rs` —
//! the closest structural analog in the pack to a single call that wires
//! config, exchange, strategy, risk, position, and notifier concerns
//! together.

use std::sync::Arc;

use serde_json::json;

use crate::clock::Clock;
use crate::decimal::Decimal;
use crate::detector::{DetectionContext, OrderDirection, SignalDetector};
use crate::error::{ErrorCategory, Result, TradingError};
use crate::events::{EventDispatcher, EventNamespace};
use crate::exits::{ExitContext, ExitPipeline, ExitReason};
use crate::executor::Executor;
use crate::guards::{GuardContext, GuardDecision, GuardPipeline};
use crate::ids::{ClientOrderId, ConditionId, MarketTokenId};
use crate::journal::Journal;
use crate::lifecycle::{LifecycleEvent, StrategyLifecycle, StrategyState};
use crate::market::MarketSide;
use crate::position::PositionManager;
use crate::registry::{OrderRegistry, OrderState, PendingOrder};
use crate::stats::StatsAccumulator;
use crate::watchdog::ConnectivityWatchdog;

/// The per-tick snapshot the runtime hands to the orchestrator: current
/// prices, balances, and time for the single market this strategy trades.
#[derive(Debug, Clone)]
pub struct TickContext {
    pub now_ms: i64,
    pub oracle_price: Decimal,
    pub spot: Decimal,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub book_age_ms: Option<i64>,
    pub time_remaining_ms: i64,
    pub available_balance: Decimal,
    pub daily_pnl: Decimal,
}

impl TickContext {
    fn spread_pct(&self) -> Decimal {
        let midpoint = self.best_bid.add(&self.best_ask).div(&Decimal::from_i64(2));
        match midpoint {
            Ok(mid) if !mid.is_zero() => {
                self.best_ask.sub(&self.best_bid).div(&mid).unwrap_or_else(|_| Decimal::zero())
            }
            _ => Decimal::zero(),
        }
    }
}

/// Static, rarely-changing identity for the market this strategy instance
/// trades, plus warmup/watchdog tuning.
pub struct StrategyConfig {
    pub condition_id: ConditionId,
    pub token_id: MarketTokenId,
    pub side: MarketSide,
    pub warmup_ticks: u32,
    pub watchdog_warning_ms: i64,
    pub watchdog_critical_ms: i64,
    /// Window used to compute `recent_order_count` and
    /// `per_market_order_count` in the guard context from the order
    /// registry's history.
    pub order_rate_window_ms: i64,
}

/// What happened during one call to [`BuiltStrategy::tick`], returned for
/// callers that want a synchronous summary in addition to the events and
/// journal entries emitted along the way.
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub entered_warmup_or_returned_early: bool,
    pub exits_submitted: usize,
    pub entry_submitted: bool,
    pub entry_blocked_by: Option<String>,
}

/// Fuses the lifecycle FSM, connectivity watchdog, guard pipeline, exit
/// pipeline, signal detector, order registry, and position manager into a
/// single `tick` operation. Owned exclusively by the task driving the tick
/// loop; a tick is a serialized operation (spec §5), so the position
/// manager and registry are mutated directly rather than copy-on-write.
pub struct BuiltStrategy {
    config: StrategyConfig,
    clock: Arc<dyn Clock>,
    lifecycle: StrategyLifecycle,
    watchdog: ConnectivityWatchdog,
    warmup_ticks_elapsed: u32,
    detector: Arc<dyn SignalDetector>,
    entry_guards: GuardPipeline,
    exit_guards: GuardPipeline,
    exits: ExitPipeline,
    executor: Arc<dyn Executor>,
    registry: OrderRegistry,
    positions: PositionManager,
    journal: Arc<dyn Journal>,
    events: Arc<EventDispatcher>,
    stats: Arc<StatsAccumulator>,
    next_client_order_id: std::sync::atomic::AtomicU64,
}

impl BuiltStrategy {
    #[must_use]
    pub fn new(
        config: StrategyConfig,
        clock: Arc<dyn Clock>,
        detector: Arc<dyn SignalDetector>,
        entry_guards: GuardPipeline,
        exits: ExitPipeline,
        executor: Arc<dyn Executor>,
        journal: Arc<dyn Journal>,
        events: Arc<EventDispatcher>,
        stats: Arc<StatsAccumulator>,
    ) -> Self {
        let now = clock.now_ms();
        let watchdog =
            ConnectivityWatchdog::new(Arc::clone(&clock), config.watchdog_warning_ms, config.watchdog_critical_ms);
        let exit_guards = entry_guards.exit_scoped();
        stats.subscribe(&events);
        Self {
            config,
            clock,
            lifecycle: StrategyLifecycle::new(now),
            watchdog,
            warmup_ticks_elapsed: 0,
            detector,
            entry_guards,
            exit_guards,
            exits,
            executor,
            registry: OrderRegistry::new(),
            positions: PositionManager::new(),
            journal,
            events,
            stats,
            next_client_order_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn lifecycle_state(&self) -> StrategyState {
        self.lifecycle.state()
    }

    #[must_use]
    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    #[must_use]
    pub fn registry(&self) -> &OrderRegistry {
        &self.registry
    }

    #[must_use]
    pub fn stats(&self) -> Arc<StatsAccumulator> {
        Arc::clone(&self.stats)
    }

    /// Apply a lifecycle event (pause/resume/halt/shutdown/...) directly,
    /// outside of a tick. Emits `state_changed`.
    pub fn apply_lifecycle_event(&mut self, event: LifecycleEvent, now_ms: i64) -> Result<StrategyState> {
        let from = self.lifecycle.state();
        let to = self.lifecycle.apply(event, now_ms)?;
        self.emit_sdk("state_changed", json!({"from": format!("{from:?}"), "to": format!("{to:?}")}));
        Ok(to)
    }

    fn next_coid(&self) -> ClientOrderId {
        let n = self.next_client_order_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        ClientOrderId::new(format!("{}-{n}", self.config.condition_id))
    }

    fn emit_sdk(&self, event_name: &str, payload: serde_json::Value) {
        self.events.publish(EventNamespace::Sdk, event_name, &payload);
    }

    fn emit_domain(&self, event_name: &str, payload: serde_json::Value) {
        self.events.publish(EventNamespace::Domain, event_name, &payload);
    }

    /// Append a journal entry inline. A write failure propagates to the
    /// caller and fails the tick (spec §7) rather than being dropped.
    async fn journal_record(&self, kind: &'static str, payload: serde_json::Value) -> Result<()> {
        let mut payload = payload;
        if let serde_json::Value::Object(ref mut map) = payload {
            map.entry("timestamp").or_insert(json!(self.clock.now_ms()));
        }
        self.journal.record(kind, payload).await?;
        Ok(())
    }

    fn guard_ctx(&self, ctx: &TickContext, for_side: MarketSide) -> GuardContext {
        let orders = self.registry.all_orders();
        let window_start = ctx.now_ms - self.config.order_rate_window_ms;
        let last_trade_time_ms = orders.iter().map(|o| o.submitted_at_ms).max();
        let recent_order_count = orders.iter().filter(|o| o.submitted_at_ms >= window_start).count();
        let per_market_order_count = orders
            .iter()
            .filter(|o| o.token_id == self.config.token_id && o.submitted_at_ms >= window_start)
            .count();

        GuardContext {
            condition_id: self.config.condition_id.clone(),
            side: for_side,
            now_ms: ctx.now_ms,
            spread_pct: ctx.spread_pct(),
            open_position_count: self.positions.open_positions().len(),
            available_balance: ctx.available_balance.clone(),
            total_exposure: self
                .positions
                .open_positions()
                .iter()
                .fold(Decimal::zero(), |acc, p| acc.add(&p.size.mul(&p.average_entry_price))),
            last_trade_time_ms,
            has_pending_order: self.registry.open_orders().iter().any(|o| {
                o.token_id == self.config.token_id && o.side == for_side
            }),
            book_age_ms: ctx.book_age_ms,
            oracle_price: ctx.oracle_price.clone(),
            best_ask: ctx.best_ask.clone(),
            recent_order_count,
            per_market_order_count,
            daily_pnl: ctx.daily_pnl.clone(),
        }
    }

    /// Run one full tick: watchdog touch, warmup advance, exit phase, entry
    /// phase, and event/journal emission, in that order (spec §4.14).
    pub async fn tick(&mut self, ctx: &TickContext) -> Result<TickSummary> {
        self.watchdog.touch();
        let mut summary = TickSummary::default();

        if self.lifecycle.state() == StrategyState::Initializing {
            self.apply_lifecycle_event(LifecycleEvent::Initialize, ctx.now_ms)?;
            summary.entered_warmup_or_returned_early = true;
            return Ok(summary);
        }

        if self.lifecycle.state() == StrategyState::WarmingUp {
            if self.config.warmup_ticks == 0 {
                self.apply_lifecycle_event(LifecycleEvent::WarmupComplete, ctx.now_ms)?;
            } else {
                self.warmup_ticks_elapsed += 1;
                let pct = ((self.warmup_ticks_elapsed as u64 * 100) / u64::from(self.config.warmup_ticks))
                    .min(100) as u8;
                self.apply_lifecycle_event(LifecycleEvent::UpdateWarmup { pct }, ctx.now_ms)?;
                if self.warmup_ticks_elapsed >= self.config.warmup_ticks {
                    self.apply_lifecycle_event(LifecycleEvent::WarmupComplete, ctx.now_ms)?;
                } else {
                    summary.entered_warmup_or_returned_early = true;
                    return Ok(summary);
                }
            }
        }

        summary.exits_submitted = self.exit_phase(ctx).await?;

        if !self.lifecycle.can_open() {
            return Ok(summary);
        }

        let (submitted, blocked_by) = self.entry_phase(ctx).await?;
        summary.entry_submitted = submitted;
        summary.entry_blocked_by = blocked_by;

        Ok(summary)
    }

    async fn exit_phase(&mut self, ctx: &TickContext) -> Result<usize> {
        self.positions.update_mark_price(&self.config.token_id, &ctx.best_bid);

        let Some(position) = self.positions.get(&self.config.token_id).cloned() else {
            return Ok(0);
        };

        let exit_ctx = ExitContext {
            now_ms: ctx.now_ms,
            best_bid: ctx.best_bid.clone(),
            oracle_price: ctx.oracle_price.clone(),
            time_remaining_ms: ctx.time_remaining_ms,
            spread_pct: ctx.spread_pct(),
        };
        let Some(reason) = self.exits.evaluate(&position, &exit_ctx) else {
            return Ok(0);
        };

        self.journal_record(
            "exit_signal",
            json!({"conditionId": self.config.condition_id.to_string(), "reason": reason.as_str()}),
        )
        .await?;

        let guard_ctx = self.guard_ctx(ctx, position.side);
        let decision = self.exit_guards.evaluate(&guard_ctx);
        if let GuardDecision::Block { guard_name, reason: block_reason, recoverable, current_value, threshold } =
            &decision
        {
            self.emit_sdk(
                "guard_blocked",
                json!({
                    "guardName": guard_name,
                    "reason": block_reason,
                    "recoverable": recoverable,
                    "currentValue": current_value,
                    "threshold": threshold,
                }),
            );
            self.journal_record(
                "guard_blocked",
                json!({"guardName": guard_name, "reason": block_reason, "recoverable": recoverable}),
            )
            .await?;
            return Ok(0);
        }

        let coid = self.next_coid();
        let intent = crate::detector::OrderIntent::try_new(
            self.config.condition_id.clone(),
            self.config.token_id.clone(),
            position.side,
            OrderDirection::Sell,
            ctx.best_bid.clone(),
            position.size.clone(),
        )?;

        self.registry.insert(PendingOrder {
            client_order_id: coid.clone(),
            exchange_order_id: None,
            token_id: self.config.token_id.clone(),
            side: position.side,
            price: intent.price.clone(),
            size: intent.size.clone(),
            filled_size: Decimal::zero(),
            state: OrderState::Pending,
            submitted_at_ms: ctx.now_ms,
        });
        self.emit_sdk(
            "order_placed",
            json!({"clientOrderId": coid.to_string(), "side": format!("{:?}", position.side), "intent": "exit"}),
        );

        match self.executor.submit(&intent, coid.clone()).await {
            Ok(result) => {
                self.advance_to_final_state(&coid, result.final_state)?;
                self.emit_sdk(
                    "fill_received",
                    json!({
                        "clientOrderId": coid.to_string(),
                        "avgFillPrice": result.avg_fill_price.to_display_string(),
                        "totalFilled": result.total_filled.to_display_string(),
                    }),
                );
                let realized = self
                    .positions
                    .close(&self.config.token_id, &result.avg_fill_price, ctx.now_ms)
                    .ok_or_else(|| TradingError::invalid_state("position vanished before close"))?;
                self.journal_record(
                    "position_closed",
                    json!({
                        "conditionId": self.config.condition_id.to_string(),
                        "reason": reason.as_str(),
                        "realizedPnl": realized.to_display_string(),
                        "fee": result.fee.to_display_string(),
                    }),
                )
                .await?;
                self.emit_domain(
                    "position_closed",
                    json!({"pnl": realized.to_f64(), "fee": result.fee.to_f64()}),
                );
                Ok(1)
            }
            Err(err) => {
                self.handle_executor_error(&coid, err).await?;
                Ok(0)
            }
        }
    }

    async fn entry_phase(&mut self, ctx: &TickContext) -> Result<(bool, Option<String>)> {
        if self.watchdog.should_block_entries() {
            return Ok((false, Some("ConnectivityWatchdog".to_string())));
        }
        if self.positions.get(&self.config.token_id).is_some() {
            // Single-market strategies only ever hold one side at a time.
            return Ok((false, None));
        }

        let detection_ctx = DetectionContext {
            condition_id: self.config.condition_id.clone(),
            now_ms: ctx.now_ms,
            oracle_price: ctx.oracle_price.clone(),
            spot: ctx.spot.clone(),
            best_bid: ctx.best_bid.clone(),
            best_ask: ctx.best_ask.clone(),
            time_remaining_ms: ctx.time_remaining_ms,
        };

        let Some(signal) = self.detector.detect_entry(&detection_ctx) else {
            return Ok((false, None));
        };
        self.journal_record(
            "entry_signal",
            json!({"conditionId": self.config.condition_id.to_string(), "edge": signal.edge.to_display_string()}),
        )
        .await?;

        let intent = self.detector.to_order(&signal, &detection_ctx)?;

        let guard_ctx = self.guard_ctx(ctx, intent.side);
        let decision = self.entry_guards.evaluate(&guard_ctx);
        if let GuardDecision::Block { guard_name, reason, recoverable, current_value, threshold } = &decision {
            self.emit_sdk(
                "guard_blocked",
                json!({
                    "guardName": guard_name,
                    "reason": reason,
                    "recoverable": recoverable,
                    "currentValue": current_value,
                    "threshold": threshold,
                }),
            );
            self.journal_record(
                "guard_blocked",
                json!({"guardName": guard_name, "reason": reason, "recoverable": recoverable}),
            )
            .await?;
            if matches!(guard_name.as_str(), "CircuitBreaker" | "KillSwitch") {
                self.emit_domain("circuit_breaker_tripped", json!({"guardName": guard_name}));
            }
            return Ok((false, Some(guard_name.clone())));
        }

        let coid = self.next_coid();
        self.registry.insert(PendingOrder {
            client_order_id: coid.clone(),
            exchange_order_id: None,
            token_id: intent.token_id.clone(),
            side: intent.side,
            price: intent.price.clone(),
            size: intent.size.clone(),
            filled_size: Decimal::zero(),
            state: OrderState::Pending,
            submitted_at_ms: ctx.now_ms,
        });
        self.journal_record(
            "order_submitted",
            json!({"clientOrderId": coid.to_string(), "side": format!("{:?}", intent.side)}),
        )
        .await?;
        self.emit_sdk(
            "order_placed",
            json!({"clientOrderId": coid.to_string(), "side": format!("{:?}", intent.side), "intent": "entry"}),
        );

        match self.executor.submit(&intent, coid.clone()).await {
            Ok(result) => {
                self.advance_to_final_state(&coid, result.final_state)?;
                self.emit_sdk(
                    "fill_received",
                    json!({
                        "clientOrderId": coid.to_string(),
                        "avgFillPrice": result.avg_fill_price.to_display_string(),
                        "totalFilled": result.total_filled.to_display_string(),
                    }),
                );
                self.positions.open(
                    intent.token_id.clone(),
                    intent.side,
                    result.total_filled.clone(),
                    result.avg_fill_price.clone(),
                    ctx.now_ms,
                );
                self.journal_record(
                    "position_opened",
                    json!({
                        "conditionId": self.config.condition_id.to_string(),
                        "entryPrice": result.avg_fill_price.to_display_string(),
                        "size": result.total_filled.to_display_string(),
                    }),
                )
                .await?;
                self.emit_sdk(
                    "position_opened",
                    json!({
                        "conditionId": self.config.condition_id.to_string(),
                        "entryPrice": result.avg_fill_price.to_display_string(),
                    }),
                );
                Ok((true, None))
            }
            Err(err) => {
                self.handle_executor_error(&coid, err).await?;
                Ok((false, None))
            }
        }
    }

    /// Walk the registry forward from `Pending` to `target`, acknowledging
    /// first when the executor's reported final state is not itself
    /// `Acknowledged` — the registry only allows `Pending -> Acknowledged`
    /// as a direct transition, never straight to a fill or terminal state.
    fn advance_to_final_state(
        &self,
        coid: &ClientOrderId,
        target: OrderState,
    ) -> Result<()> {
        if target != OrderState::Acknowledged {
            self.registry.transition(coid, OrderState::Acknowledged)?;
        }
        self.registry.transition(coid, target)?;
        Ok(())
    }

    /// Classify and emit an executor failure. Fatal errors halt the
    /// lifecycle; retryable/non-retryable errors are surfaced as events
    /// without propagating further up (spec §7).
    async fn handle_executor_error(&mut self, coid: &ClientOrderId, err: TradingError) -> Result<()> {
        let _ = self.registry.transition(coid, OrderState::Rejected);
        self.emit_sdk(
            "error_occurred",
            json!({"code": err.code(), "category": format!("{:?}", err.category()), "clientOrderId": coid.to_string()}),
        );
        self.journal_record("error", json!({"code": err.code(), "clientOrderId": coid.to_string()})).await?;
        if err.category() == ErrorCategory::Fatal {
            let now = self.clock.now_ms();
            self.apply_lifecycle_event(
                LifecycleEvent::Halt { reason: format!("fatal executor error: {err}") },
                now,
            )?;
        }
        Ok(())
    }
}
