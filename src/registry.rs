//! Order lifecycle registry.
//!
//! Tracks every order this process has submitted, from `Pending` through to
//! a terminal state. Transitions are forward-only: once an order reaches a
//! terminal state it cannot be transitioned again. Grounded on the
//! teacher's `core/domain/execution.rs` order-state tracking, generalized
//! to the spec's five-state model.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::error::TradingError;
use crate::ids::{ClientOrderId, ExchangeOrderId, MarketTokenId};
use crate::market::MarketSide;

/// Where an order sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Pending,
    Acknowledged,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    fn can_transition_to(self, next: Self) -> bool {
        use OrderState::{Acknowledged, Cancelled, Filled, PartiallyFilled, Pending, Rejected};
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Acknowledged)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Acknowledged, PartiallyFilled)
                | (Acknowledged, Filled)
                | (Acknowledged, Cancelled)
                | (Acknowledged, Rejected)
                | (PartiallyFilled, PartiallyFilled)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub client_order_id: ClientOrderId,
    pub exchange_order_id: Option<ExchangeOrderId>,
    pub token_id: MarketTokenId,
    pub side: MarketSide,
    pub price: Decimal,
    pub size: Decimal,
    pub filled_size: Decimal,
    pub state: OrderState,
    pub submitted_at_ms: i64,
}

/// A forward-only registry of in-flight and completed orders, keyed by the
/// client order id assigned at submission time.
#[derive(Default)]
pub struct OrderRegistry {
    orders: RwLock<HashMap<ClientOrderId, PendingOrder>>,
}

impl OrderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { orders: RwLock::new(HashMap::new()) }
    }

    pub fn insert(&self, order: PendingOrder) {
        self.orders.write().insert(order.client_order_id.clone(), order);
    }

    #[must_use]
    pub fn get(&self, id: &ClientOrderId) -> Option<PendingOrder> {
        self.orders.read().get(id).cloned()
    }

    #[must_use]
    pub fn open_orders(&self) -> Vec<PendingOrder> {
        self.orders.read().values().filter(|o| !o.state.is_terminal()).cloned().collect()
    }

    /// Every order this registry has ever held, regardless of state, in no
    /// particular order. Used to derive rolling order-rate and last-trade
    /// timestamps for the guard context.
    #[must_use]
    pub fn all_orders(&self) -> Vec<PendingOrder> {
        self.orders.read().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    /// Move an order forward to `next`. Fails if the order is unknown or if
    /// the transition is not allowed from its current state.
    pub fn transition(&self, id: &ClientOrderId, next: OrderState) -> Result<PendingOrder, TradingError> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(id)
            .ok_or_else(|| TradingError::invalid_state(format!("unknown order {id}")))?;
        if !order.state.can_transition_to(next) {
            return Err(TradingError::invalid_state(format!(
                "order {id} cannot transition from {:?} to {:?}",
                order.state, next
            )));
        }
        order.state = next;
        Ok(order.clone())
    }

    /// Record a (partial) fill, accumulating `filled_size` and moving the
    /// order to `PartiallyFilled` or `Filled` depending on whether the fill
    /// completes the order.
    pub fn record_fill(
        &self,
        id: &ClientOrderId,
        fill_size: &Decimal,
    ) -> Result<PendingOrder, TradingError> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(id)
            .ok_or_else(|| TradingError::invalid_state(format!("unknown order {id}")))?;
        let new_filled = order.filled_size.add(fill_size);
        let next = if new_filled.gte(&order.size) { OrderState::Filled } else { OrderState::PartiallyFilled };
        if !order.state.can_transition_to(next) {
            return Err(TradingError::invalid_state(format!(
                "order {id} cannot record fill from state {:?}",
                order.state
            )));
        }
        order.filled_size = new_filled;
        order.state = next;
        Ok(order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample(id: &str) -> PendingOrder {
        PendingOrder {
            client_order_id: ClientOrderId::new(id),
            exchange_order_id: None,
            token_id: MarketTokenId::new("token-1"),
            side: MarketSide::Yes,
            price: Decimal::from_str("0.5").unwrap(),
            size: Decimal::from_str("10").unwrap(),
            filled_size: Decimal::zero(),
            state: OrderState::Pending,
            submitted_at_ms: 0,
        }
    }

    #[test]
    fn forward_transition_succeeds() {
        let registry = OrderRegistry::new();
        registry.insert(sample("a"));
        let id = ClientOrderId::new("a");
        let updated = registry.transition(&id, OrderState::Acknowledged).unwrap();
        assert_eq!(updated.state, OrderState::Acknowledged);
    }

    #[test]
    fn terminal_state_rejects_further_transitions() {
        let registry = OrderRegistry::new();
        registry.insert(sample("a"));
        let id = ClientOrderId::new("a");
        registry.transition(&id, OrderState::Acknowledged).unwrap();
        registry.transition(&id, OrderState::Filled).unwrap();
        assert!(registry.transition(&id, OrderState::Cancelled).is_err());
    }

    #[test]
    fn unknown_order_errors() {
        let registry = OrderRegistry::new();
        let id = ClientOrderId::new("missing");
        assert!(registry.transition(&id, OrderState::Acknowledged).is_err());
    }

    #[test]
    fn partial_fill_then_full_fill() {
        let registry = OrderRegistry::new();
        registry.insert(sample("a"));
        let id = ClientOrderId::new("a");
        registry.transition(&id, OrderState::Acknowledged).unwrap();
        let after_partial = registry.record_fill(&id, &Decimal::from_str("4").unwrap()).unwrap();
        assert_eq!(after_partial.state, OrderState::PartiallyFilled);
        let after_full = registry.record_fill(&id, &Decimal::from_str("6").unwrap()).unwrap();
        assert_eq!(after_full.state, OrderState::Filled);
    }

    #[test]
    fn all_orders_includes_terminal() {
        let registry = OrderRegistry::new();
        registry.insert(sample("a"));
        registry.transition(&ClientOrderId::new("a"), OrderState::Acknowledged).unwrap();
        registry.transition(&ClientOrderId::new("a"), OrderState::Filled).unwrap();
        assert_eq!(registry.all_orders().len(), 1);
        assert!(registry.open_orders().is_empty());
    }

    #[test]
    fn open_orders_excludes_terminal() {
        let registry = OrderRegistry::new();
        registry.insert(sample("a"));
        registry.insert(sample("b"));
        registry.transition(&ClientOrderId::new("a"), OrderState::Acknowledged).unwrap();
        registry.transition(&ClientOrderId::new("a"), OrderState::Cancelled).unwrap();
        let open = registry.open_orders();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].client_order_id, ClientOrderId::new("b"));
    }
}
