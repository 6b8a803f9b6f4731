//! Execution backend abstraction.
//!
//! Spec §6: `submit`/`cancel` are the two suspension points an executor
//! implementation must bound with a per-call timeout (raising `Timeout` on
//! expiry). Grounded on the teacher's `core/exchange` executor trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::detector::OrderIntent;
use crate::error::Result;
use crate::ids::{ClientOrderId, ExchangeOrderId};
use crate::registry::OrderState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub client_order_id: ClientOrderId,
    pub exchange_order_id: Option<ExchangeOrderId>,
    pub final_state: OrderState,
    pub total_filled: Decimal,
    pub avg_fill_price: Decimal,
    pub trade_id: Option<String>,
    pub fee: Decimal,
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn submit(&self, intent: &OrderIntent, client_order_id: ClientOrderId) -> Result<OrderResult>;
    async fn cancel(&self, client_order_id: &ClientOrderId) -> Result<()>;
}
