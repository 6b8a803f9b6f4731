//! Position tracking and realized P&L.
//!
//! Spec §4.7 describes position updates as producing a new position value;
//! this crate resolves that to Rust's idiomatic `&mut self` mutation
//! (recorded as an Open Question decision in `DESIGN.md`) while keeping the
//! same observable behavior: `open`/`reduce`/`close` never mutate history
//! that has already closed, and a bounded ring of recently closed positions
//! is kept for the statistics accumulator. Grounded on the teacher's
//! `core/domain/position.rs`.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::ids::MarketTokenId;
use crate::market::MarketSide;

/// The maximum number of closed positions retained for inspection; older
/// entries are evicted oldest-first.
pub const CLOSED_HISTORY_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub token_id: MarketTokenId,
    pub side: MarketSide,
    pub size: Decimal,
    pub average_entry_price: Decimal,
    pub opened_at_ms: i64,
    /// Best mark price observed for this position's side since it opened,
    /// consumed by trailing-stop exit policies.
    pub high_water_mark: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub token_id: MarketTokenId,
    pub side: MarketSide,
    pub size: Decimal,
    pub average_entry_price: Decimal,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub opened_at_ms: i64,
    pub closed_at_ms: i64,
}

/// Tracks open exposure per token and a bounded history of closed trades,
/// plus a running total of realized P&L across the process lifetime.
#[derive(Default)]
pub struct PositionManager {
    open: HashMap<MarketTokenId, OpenPosition>,
    closed: VecDeque<ClosedPosition>,
    realized_pnl_total: Decimal,
}

impl PositionManager {
    #[must_use]
    pub fn new() -> Self {
        Self { open: HashMap::new(), closed: VecDeque::new(), realized_pnl_total: Decimal::zero() }
    }

    #[must_use]
    pub fn get(&self, token_id: &MarketTokenId) -> Option<&OpenPosition> {
        self.open.get(token_id)
    }

    #[must_use]
    pub fn open_positions(&self) -> Vec<OpenPosition> {
        self.open.values().cloned().collect()
    }

    #[must_use]
    pub fn closed_positions(&self) -> Vec<ClosedPosition> {
        self.closed.iter().cloned().collect()
    }

    #[must_use]
    pub fn realized_pnl_total(&self) -> &Decimal {
        &self.realized_pnl_total
    }

    /// Open a new position, or add to an existing one on the same token and
    /// side, recomputing a size-weighted average entry price.
    pub fn open(
        &mut self,
        token_id: MarketTokenId,
        side: MarketSide,
        size: Decimal,
        price: Decimal,
        now_ms: i64,
    ) {
        match self.open.get_mut(&token_id) {
            Some(existing) if existing.side == side => {
                let total_size = existing.size.add(&size);
                let weighted = existing
                    .average_entry_price
                    .mul(&existing.size)
                    .add(&price.mul(&size));
                existing.average_entry_price =
                    weighted.div(&total_size).unwrap_or_else(|_| price.clone());
                existing.size = total_size;
                if price.gt(&existing.high_water_mark) {
                    existing.high_water_mark = price;
                }
            }
            _ => {
                self.open.insert(
                    token_id.clone(),
                    OpenPosition {
                        token_id,
                        side,
                        size,
                        average_entry_price: price.clone(),
                        opened_at_ms: now_ms,
                        high_water_mark: price,
                    },
                );
            }
        }
    }

    /// Update the high-water mark for an open position given the latest
    /// mark price on its side, if higher than what is already recorded.
    /// Called once per tick by the orchestrator before evaluating exits.
    pub fn update_mark_price(&mut self, token_id: &MarketTokenId, mark_price: &Decimal) {
        if let Some(position) = self.open.get_mut(token_id) {
            if mark_price.gt(&position.high_water_mark) {
                position.high_water_mark = mark_price.clone();
            }
        }
    }

    /// Reduce an open position by `size` at `exit_price`, realizing P&L on
    /// the reduced portion. Returns the realized P&L for this reduction, or
    /// `None` if there is no open position on `token_id`.
    pub fn reduce(
        &mut self,
        token_id: &MarketTokenId,
        size: &Decimal,
        exit_price: &Decimal,
        now_ms: i64,
    ) -> Option<Decimal> {
        let position = self.open.get_mut(token_id)?;
        let reduce_size = if size.gt(&position.size) { position.size.clone() } else { size.clone() };
        let direction = match position.side {
            MarketSide::Yes => Decimal::one(),
            MarketSide::No => Decimal::one().neg(),
        };
        let pnl = exit_price
            .sub(&position.average_entry_price)
            .mul(&reduce_size)
            .mul(&direction);

        self.realized_pnl_total = self.realized_pnl_total.add(&pnl);
        let remaining = position.size.sub(&reduce_size);

        let closed_entry = ClosedPosition {
            token_id: position.token_id.clone(),
            side: position.side,
            size: reduce_size.clone(),
            average_entry_price: position.average_entry_price.clone(),
            exit_price: exit_price.clone(),
            realized_pnl: pnl.clone(),
            opened_at_ms: position.opened_at_ms,
            closed_at_ms: now_ms,
        };
        self.push_closed(closed_entry);

        if remaining.is_zero() {
            self.open.remove(token_id);
        } else {
            position.size = remaining;
        }
        Some(pnl)
    }

    /// Fully close a position at `exit_price`. Equivalent to `reduce` by
    /// the whole open size.
    pub fn close(&mut self, token_id: &MarketTokenId, exit_price: &Decimal, now_ms: i64) -> Option<Decimal> {
        let size = self.open.get(token_id)?.size.clone();
        self.reduce(token_id, &size, exit_price, now_ms)
    }

    fn push_closed(&mut self, entry: ClosedPosition) {
        if self.closed.len() >= CLOSED_HISTORY_CAPACITY {
            self.closed.pop_front();
        }
        self.closed.push_back(entry);
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
    fn opening_then_adding_averages_price() {
        let mut pm = PositionManager::new();
        let token = MarketTokenId::new("t1");
        pm.open(token.clone(), MarketSide::Yes, d("10"), d("0.40"), 0);
        pm.open(token.clone(), MarketSide::Yes, d("10"), d("0.60"), 0);
        let pos = pm.get(&token).unwrap();
        assert!(pos.average_entry_price.eq_to(&d("0.50")));
        assert!(pos.size.eq_to(&d("20")));
    }

    #[test]
    fn reduce_realizes_pnl_for_yes_side() {
        let mut pm = PositionManager::new();
        let token = MarketTokenId::new("t1");
        pm.open(token.clone(), MarketSide::Yes, d("10"), d("0.40"), 0);
        let pnl = pm.reduce(&token, &d("10"), &d("0.60"), 100).unwrap();
        assert!(pnl.eq_to(&d("2.00")));
        assert!(pm.get(&token).is_none());
        assert!(pm.realized_pnl_total().eq_to(&d("2.00")));
    }

    #[test]
    fn reduce_on_no_side_inverts_direction() {
        let mut pm = PositionManager::new();
        let token = MarketTokenId::new("t1");
        pm.open(token.clone(), MarketSide::No, d("10"), d("0.40"), 0);
        // Price moves up; a No holder loses.
        let pnl = pm.reduce(&token, &d("10"), &d("0.60"), 100).unwrap();
        assert!(pnl.eq_to(&d("-2.00")));
    }

    #[test]
    fn partial_reduce_keeps_remainder_open() {
        let mut pm = PositionManager::new();
        let token = MarketTokenId::new("t1");
        pm.open(token.clone(), MarketSide::Yes, d("10"), d("0.40"), 0);
        pm.reduce(&token, &d("4"), &d("0.50"), 50);
        let remaining = pm.get(&token).unwrap();
        assert!(remaining.size.eq_to(&d("6")));
        assert_eq!(pm.closed_positions().len(), 1);
    }

    #[test]
    fn closed_history_is_bounded() {
        let mut pm = PositionManager::new();
        for i in 0..(CLOSED_HISTORY_CAPACITY + 5) {
            let token = MarketTokenId::new(format!("t{i}"));
            pm.open(token.clone(), MarketSide::Yes, d("1"), d("0.5"), 0);
            pm.close(&token, &d("0.5"), 1);
        }
        assert_eq!(pm.closed_positions().len(), CLOSED_HISTORY_CAPACITY);
    }

    #[test]
    fn reduce_without_open_position_returns_none() {
        let mut pm = PositionManager::new();
        let token = MarketTokenId::new("missing");
        assert!(pm.reduce(&token, &d("1"), &d("0.5"), 0).is_none());
    }
}
