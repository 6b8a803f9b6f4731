//! Paper-trading executor.
//!
//! Fills every order immediately at its requested price, with zero fees,
//! so the full tick pipeline can be exercised without touching a real
//! exchange. Supplements the spec's §6 `Executor` interface with the one
//! concrete implementation this crate ships (SPEC_FULL.md §F) — grounded
//! on the teacher's in-memory execution stub used for its own dry-run mode.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;

use crate::clock::Clock;
use crate::decimal::Decimal;
use crate::detector::OrderIntent;
use crate::error::Result;
use crate::executor::{Executor, OrderResult};
use crate::ids::{ClientOrderId, ExchangeOrderId};
use crate::registry::OrderState;

/// Fills every order immediately at its requested price, with zero fees —
/// the one concrete [`Executor`] this crate ships, for dry-run mode and
/// tests. Exchange order ids and trade ids are synthesized with `uuid`
/// rather than a counter, since a real venue would hand back opaque ids of
/// its own and downstream code must not assume any particular shape.
pub struct PaperExecutor {
    clock: std::sync::Arc<dyn Clock>,
    /// Small simulated price improvement/slippage applied to every fill, in
    /// price units, so paper trading isn't perfectly frictionless. Zero by
    /// default (see [`PaperExecutor::new`]).
    max_slippage: Decimal,
    fills: Mutex<Vec<ClientOrderId>>,
}

impl PaperExecutor {
    #[must_use]
    pub fn new(clock: std::sync::Arc<dyn Clock>) -> Self {
        Self { clock, max_slippage: Decimal::zero(), fills: Mutex::new(Vec::new()) }
    }

    /// A `PaperExecutor` that fills with up to `max_slippage` of adverse
    /// price movement applied at random, to exercise strategy code against
    /// something less idealized than an exact fill.
    #[must_use]
    pub fn with_slippage(clock: std::sync::Arc<dyn Clock>, max_slippage: Decimal) -> Self {
        Self { clock, max_slippage, fills: Mutex::new(Vec::new()) }
    }

    #[must_use]
    pub fn fill_count(&self) -> usize {
        self.fills.lock().len()
    }
}

#[async_trait]
impl Executor for PaperExecutor {
    async fn submit(&self, intent: &OrderIntent, client_order_id: ClientOrderId) -> Result<OrderResult> {
        let _ = self.clock.now_ms();
        self.fills.lock().push(client_order_id.clone());

        let fill_price = if self.max_slippage.is_zero() {
            intent.price.clone()
        } else {
            let fraction = rand::thread_rng().gen_range(0.0..1.0);
            let adverse = self.max_slippage.mul(&Decimal::from_f64_lossy(fraction));
            match intent.direction {
                crate::detector::OrderDirection::Buy => intent.price.add(&adverse),
                crate::detector::OrderDirection::Sell => intent.price.sub(&adverse),
            }
        };

        Ok(OrderResult {
            client_order_id,
            exchange_order_id: Some(ExchangeOrderId::new(format!("paper-{}", uuid::Uuid::new_v4()))),
            final_state: OrderState::Filled,
            total_filled: intent.size.clone(),
            avg_fill_price: fill_price,
            trade_id: Some(format!("paper-trade-{}", uuid::Uuid::new_v4())),
            fee: Decimal::zero(),
        })
    }

    async fn cancel(&self, _client_order_id: &ClientOrderId) -> Result<()> {
        Ok(())
    }
}
