//! Exit pipeline.
//!
//! Spec §4.9: an ordered list of [`ExitPolicy`], each evaluated against an
//! open position and a narrow market context; the first reason produced
//! wins. Unlike the entry guard pipeline, exits do not short-circuit on
//! "no reason" — every policy in order gets a look until one fires.
//! Grounded on the teacher's `core/service/exit.rs` policy chain.

mod policies;

use std::sync::Arc;

pub use policies::{EdgeReversal, NearExpiry, ProfitLocker, StopLoss, TakeProfit, TimeExit, TrailingStop};

use crate::decimal::Decimal;
use crate::position::OpenPosition;

/// Why a position was exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    TimeExit,
    EdgeReversal,
    NearExpiry,
    Emergency,
}

impl ExitReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
            Self::TrailingStop => "trailing_stop",
            Self::TimeExit => "time_exit",
            Self::EdgeReversal => "edge_reversal",
            Self::NearExpiry => "near_expiry",
            Self::Emergency => "emergency",
        }
    }
}

/// The narrow market context exit policies are evaluated against.
#[derive(Debug, Clone)]
pub struct ExitContext {
    pub now_ms: i64,
    pub best_bid: Decimal,
    pub oracle_price: Decimal,
    pub time_remaining_ms: i64,
    pub spread_pct: Decimal,
}

pub trait ExitPolicy: Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, position: &OpenPosition, ctx: &ExitContext) -> Option<ExitReason>;
}

/// An ordered, immutable chain of exit policies.
#[derive(Clone, Default)]
pub struct ExitPipeline {
    policies: Arc<Vec<Arc<dyn ExitPolicy>>>,
}

impl ExitPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self { policies: Arc::new(Vec::new()) }
    }

    #[must_use]
    pub fn with(&self, policy: Arc<dyn ExitPolicy>) -> Self {
        let mut policies = (*self.policies).clone();
        policies.push(policy);
        Self { policies: Arc::new(policies) }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Returns the first exit reason produced by any policy in order, or
    /// `None` if no policy fires.
    #[must_use]
    pub fn evaluate(&self, position: &OpenPosition, ctx: &ExitContext) -> Option<ExitReason> {
        for policy in self.policies.iter() {
            if let Some(reason) = policy.evaluate(position, ctx) {
                return Some(reason);
            }
        }
        None
    }
}
