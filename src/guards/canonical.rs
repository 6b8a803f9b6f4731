//! The fourteen canonical entry guards.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{EntryGuard, GuardContext, GuardDecision};
use crate::decimal::Decimal;
use crate::ids::ConditionId;

pub struct MaxSpread {
    pub max_spread_pct: Decimal,
}

impl EntryGuard for MaxSpread {
    fn name(&self) -> &str {
        "MaxSpread"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        if ctx.spread_pct.gt(&self.max_spread_pct) {
            return GuardDecision::block_with_values(
                self.name(),
                "spread exceeds configured maximum",
                true,
                ctx.spread_pct.to_display_string(),
                self.max_spread_pct.to_display_string(),
            );
        }
        GuardDecision::Allow
    }
}

pub struct MaxPositions {
    pub max_positions: usize,
}

impl EntryGuard for MaxPositions {
    fn name(&self) -> &str {
        "MaxPositions"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        if ctx.open_position_count >= self.max_positions {
            return GuardDecision::block_with_values(
                self.name(),
                "open position count at or above limit",
                true,
                ctx.open_position_count.to_string(),
                self.max_positions.to_string(),
            );
        }
        GuardDecision::Allow
    }
}

pub struct Balance {
    pub min_balance: Decimal,
}

impl EntryGuard for Balance {
    fn name(&self) -> &str {
        "Balance"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        if ctx.available_balance.lt(&self.min_balance) {
            return GuardDecision::block_with_values(
                self.name(),
                "available balance below minimum",
                true,
                ctx.available_balance.to_display_string(),
                self.min_balance.to_display_string(),
            );
        }
        GuardDecision::Allow
    }
}

pub struct Exposure {
    pub max_pct: Decimal,
}

impl EntryGuard for Exposure {
    fn name(&self) -> &str {
        "Exposure"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        if ctx.available_balance.is_zero() {
            return GuardDecision::Allow;
        }
        let Ok(ratio) = ctx.total_exposure.div(&ctx.available_balance) else {
            return GuardDecision::Allow;
        };
        if ratio.gt(&self.max_pct) {
            return GuardDecision::block_with_values(
                self.name(),
                "exposure-to-balance ratio exceeds maximum",
                true,
                ratio.to_display_string(),
                self.max_pct.to_display_string(),
            );
        }
        GuardDecision::Allow
    }
}

pub struct Cooldown {
    pub cooldown_ms: i64,
}

impl EntryGuard for Cooldown {
    fn name(&self) -> &str {
        "Cooldown"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        if let Some(last) = ctx.last_trade_time_ms {
            if ctx.now_ms - last < self.cooldown_ms {
                return GuardDecision::block(
                    self.name(),
                    "cooldown period has not elapsed since the last trade",
                    true,
                );
            }
        }
        GuardDecision::Allow
    }
}

pub struct DuplicateOrder;

impl EntryGuard for DuplicateOrder {
    fn name(&self) -> &str {
        "DuplicateOrder"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        if ctx.has_pending_order {
            return GuardDecision::block(
                self.name(),
                "a pending order already exists for this condition and side",
                true,
            );
        }
        GuardDecision::Allow
    }
}

pub struct BookStaleness {
    pub max_ms: i64,
}

impl EntryGuard for BookStaleness {
    fn name(&self) -> &str {
        "BookStaleness"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        if let Some(age) = ctx.book_age_ms {
            if age > self.max_ms {
                return GuardDecision::block_with_values(
                    self.name(),
                    "order book is stale",
                    true,
                    age.to_string(),
                    self.max_ms.to_string(),
                );
            }
        }
        GuardDecision::Allow
    }
}

pub struct MinEdge {
    pub min_edge: Decimal,
}

impl EntryGuard for MinEdge {
    fn name(&self) -> &str {
        "MinEdge"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        if ctx.best_ask.is_zero() {
            return GuardDecision::block(self.name(), "best ask is zero", true);
        }
        let Ok(edge) = ctx.oracle_price.sub(&ctx.best_ask).abs().div(&ctx.best_ask) else {
            return GuardDecision::block(self.name(), "edge could not be computed", true);
        };
        if edge.lt(&self.min_edge) {
            return GuardDecision::block_with_values(
                self.name(),
                "edge below configured minimum",
                true,
                edge.to_display_string(),
                self.min_edge.to_display_string(),
            );
        }
        GuardDecision::Allow
    }
}

/// A simple rolling window order counter, shared across ticks.
pub struct RateLimit {
    pub limit: usize,
    pub window_ms: i64,
    timestamps: Mutex<Vec<i64>>,
}

impl RateLimit {
    #[must_use]
    pub fn new(limit: usize, window_ms: i64) -> Self {
        Self { limit, window_ms, timestamps: Mutex::new(Vec::new()) }
    }

    pub fn record_order(&self, now_ms: i64) {
        let mut timestamps = self.timestamps.lock();
        timestamps.push(now_ms);
        let cutoff = now_ms - self.window_ms;
        timestamps.retain(|&t| t >= cutoff);
    }
}

impl EntryGuard for RateLimit {
    fn name(&self) -> &str {
        "RateLimit"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        let count = {
            let mut timestamps = self.timestamps.lock();
            let cutoff = ctx.now_ms - self.window_ms;
            timestamps.retain(|&t| t >= cutoff);
            timestamps.len()
        };
        if count >= self.limit {
            return GuardDecision::block_with_values(
                self.name(),
                "order rate limit reached for the rolling window",
                true,
                count.to_string(),
                self.limit.to_string(),
            );
        }
        GuardDecision::Allow
    }
}

pub struct PerMarketLimit {
    pub limit: usize,
}

impl EntryGuard for PerMarketLimit {
    fn name(&self) -> &str {
        "PerMarketLimit"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        if ctx.per_market_order_count >= self.limit {
            return GuardDecision::block_with_values(
                self.name(),
                "per-market order count at or above limit",
                true,
                ctx.per_market_order_count.to_string(),
                self.limit.to_string(),
            );
        }
        GuardDecision::Allow
    }
}

pub struct PortfolioRisk {
    pub max_drawdown: Decimal,
}

impl EntryGuard for PortfolioRisk {
    fn name(&self) -> &str {
        "PortfolioRisk"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        if ctx.available_balance.is_zero() {
            return GuardDecision::Allow;
        }
        let Ok(drawdown) = ctx.daily_pnl.neg().div(&ctx.available_balance) else {
            return GuardDecision::Allow;
        };
        if drawdown.gte(&self.max_drawdown) {
            return GuardDecision::block_with_values(
                self.name(),
                "portfolio drawdown at or beyond maximum",
                false,
                drawdown.to_display_string(),
                self.max_drawdown.to_display_string(),
            );
        }
        GuardDecision::Allow
    }
}

pub struct Toxicity {
    block_list: HashSet<ConditionId>,
}

impl Toxicity {
    #[must_use]
    pub fn new(block_list: impl IntoIterator<Item = ConditionId>) -> Self {
        Self { block_list: block_list.into_iter().collect() }
    }
}

impl EntryGuard for Toxicity {
    fn name(&self) -> &str {
        "Toxicity"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        if self.block_list.contains(&ctx.condition_id) {
            return GuardDecision::block(self.name(), "condition is on the toxicity block-list", false);
        }
        GuardDecision::Allow
    }
}

/// Kill-switch operating mode. `ExitsOnly`/`Full` are reached automatically
/// on soft/hard drawdown breaches; per the spec's resolved Open Question,
/// only an explicit [`KillSwitch::disengage`] clears an auto-engaged mode —
/// there is no implicit recovery on the next healthy tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSwitchMode {
    Off,
    ExitsOnly,
    Full,
}

pub struct KillSwitch {
    pub soft_pct: Decimal,
    pub hard_pct: Decimal,
    pub reference_balance: Decimal,
    mode: Mutex<KillSwitchMode>,
}

impl KillSwitch {
    #[must_use]
    pub fn new(soft_pct: Decimal, hard_pct: Decimal, reference_balance: Decimal) -> Self {
        Self { soft_pct, hard_pct, reference_balance, mode: Mutex::new(KillSwitchMode::Off) }
    }

    #[must_use]
    pub fn mode(&self) -> KillSwitchMode {
        *self.mode.lock()
    }

    pub fn disengage(&self) {
        *self.mode.lock() = KillSwitchMode::Off;
    }

    fn evaluate_mode(&self, daily_pnl: &Decimal) -> KillSwitchMode {
        if self.reference_balance.is_zero() {
            return KillSwitchMode::Off;
        }
        let Ok(loss_pct) = daily_pnl.neg().div(&self.reference_balance) else {
            return KillSwitchMode::Off;
        };
        if loss_pct.gte(&self.hard_pct) {
            KillSwitchMode::Full
        } else if loss_pct.gte(&self.soft_pct) {
            KillSwitchMode::ExitsOnly
        } else {
            KillSwitchMode::Off
        }
    }
}

impl EntryGuard for KillSwitch {
    fn name(&self) -> &str {
        "KillSwitch"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        let breach = self.evaluate_mode(&ctx.daily_pnl);
        {
            let mut mode = self.mode.lock();
            if breach != KillSwitchMode::Off {
                *mode = breach;
            }
        }
        match self.mode() {
            KillSwitchMode::Off => GuardDecision::Allow,
            KillSwitchMode::ExitsOnly => {
                GuardDecision::block(self.name(), "kill-switch engaged: exits only", false)
            }
            KillSwitchMode::Full => {
                GuardDecision::block(self.name(), "kill-switch engaged: all entries blocked", false)
            }
        }
    }
}

pub struct CircuitBreaker {
    pub daily_loss_threshold: Decimal,
    pub consecutive_loss_threshold: u32,
    pub cooldown_ms: i64,
    consecutive_losses: AtomicU64,
    tripped_at_ms: AtomicI64,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(daily_loss_threshold: Decimal, consecutive_loss_threshold: u32, cooldown_ms: i64) -> Self {
        Self {
            daily_loss_threshold,
            consecutive_loss_threshold,
            cooldown_ms,
            consecutive_losses: AtomicU64::new(0),
            tripped_at_ms: AtomicI64::new(i64::MIN),
        }
    }

    pub fn record_trade_result(&self, pnl: &Decimal) {
        if pnl.is_negative() {
            self.consecutive_losses.fetch_add(1, Ordering::SeqCst);
        } else {
            self.consecutive_losses.store(0, Ordering::SeqCst);
        }
    }

    fn is_tripped(&self, ctx: &GuardContext) -> bool {
        let daily_loss_tripped = ctx.daily_pnl.neg().gte(&self.daily_loss_threshold);
        let consecutive_tripped =
            self.consecutive_losses.load(Ordering::SeqCst) >= u64::from(self.consecutive_loss_threshold);
        daily_loss_tripped || consecutive_tripped
    }
}

impl EntryGuard for CircuitBreaker {
    fn name(&self) -> &str {
        "CircuitBreaker"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        let tripped_at = self.tripped_at_ms.load(Ordering::SeqCst);
        if tripped_at != i64::MIN {
            if ctx.now_ms - tripped_at < self.cooldown_ms {
                return GuardDecision::block(self.name(), "circuit breaker cooling down", true);
            }
            self.tripped_at_ms.store(i64::MIN, Ordering::SeqCst);
            self.consecutive_losses.store(0, Ordering::SeqCst);
        }
        if self.is_tripped(ctx) {
            self.tripped_at_ms.store(ctx.now_ms, Ordering::SeqCst);
            return GuardDecision::block(self.name(), "circuit breaker tripped", true);
        }
        GuardDecision::Allow
    }
}

pub struct UsdcRejection;

impl EntryGuard for UsdcRejection {
    fn name(&self) -> &str {
        "UsdcRejection"
    }
    fn check(&self, ctx: &GuardContext) -> GuardDecision {
        if ctx.condition_id.as_str().to_ascii_lowercase().contains("usdc.e") {
            return GuardDecision::block(self.name(), "condition references usdc.e", false);
        }
        GuardDecision::Allow
    }
}
