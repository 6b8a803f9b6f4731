//! Strategy lifecycle state machine.
//!
//! Spec §4.11: seven states, transitions keyed by tagged events; `Shutdown`
//! is a terminal sink and `Halted` only accepts `shutdown`. Grounded on the
//! teacher's `core/domain/lifecycle.rs` (if present) state machine idiom,
//! generalized to the spec's seven-state model with bounded history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::TradingError;

/// The maximum number of transitions retained in history; oldest entries
/// are evicted first.
pub const HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyState {
    Initializing,
    WarmingUp,
    Active,
    Paused,
    ClosingOnly,
    Halted,
    Shutdown,
}

/// A tagged lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Initialize,
    UpdateWarmup { pct: u8 },
    WarmupComplete,
    Pause { reason: String },
    Resume,
    EnterClosingOnly,
    Halt { reason: String },
    Shutdown,
}

impl LifecycleEvent {
    fn tag(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::UpdateWarmup { .. } => "update_warmup",
            Self::WarmupComplete => "warmup_complete",
            Self::Pause { .. } => "pause",
            Self::Resume => "resume",
            Self::EnterClosingOnly => "enter_closing_only",
            Self::Halt { .. } => "halt",
            Self::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: StrategyState,
    pub to: StrategyState,
    pub event_tag: String,
    pub at_ms: i64,
}

pub struct StrategyLifecycle {
    state: StrategyState,
    warmup_pct: u8,
    entered_state_at_ms: i64,
    history: VecDeque<TransitionRecord>,
}

impl StrategyLifecycle {
    #[must_use]
    pub fn new(now_ms: i64) -> Self {
        Self {
            state: StrategyState::Initializing,
            warmup_pct: 0,
            entered_state_at_ms: now_ms,
            history: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> StrategyState {
        self.state
    }

    #[must_use]
    pub fn warmup_pct(&self) -> u8 {
        self.warmup_pct
    }

    #[must_use]
    pub fn can_open(&self) -> bool {
        self.state == StrategyState::Active
    }

    #[must_use]
    pub fn can_close(&self) -> bool {
        matches!(self.state, StrategyState::Active | StrategyState::Paused | StrategyState::ClosingOnly)
    }

    #[must_use]
    pub fn time_in_state(&self, now_ms: i64) -> i64 {
        now_ms - self.entered_state_at_ms
    }

    #[must_use]
    pub fn history(&self) -> Vec<TransitionRecord> {
        self.history.iter().cloned().collect()
    }

    /// Apply `event`, recording a transition on success. The only accepted
    /// event from `Shutdown` is none at all (`AlreadyTerminal`); `resume`
    /// from `Halted` always fails (`CannotResumeFromHalt`).
    pub fn apply(&mut self, event: LifecycleEvent, now_ms: i64) -> Result<StrategyState, TradingError> {
        use StrategyState::{Active, ClosingOnly, Halted, Initializing, Paused, Shutdown, WarmingUp};

        if self.state == Shutdown {
            return Err(TradingError::invalid_state("AlreadyTerminal: no transition out of Shutdown"));
        }

        if matches!(event, LifecycleEvent::Shutdown) {
            return self.transition(Shutdown, &event, now_ms);
        }

        let next = match (&self.state, &event) {
            (Initializing, LifecycleEvent::Initialize) => WarmingUp,
            (WarmingUp, LifecycleEvent::UpdateWarmup { pct }) => {
                self.warmup_pct = (*pct).min(100);
                return Ok(self.state);
            }
            (WarmingUp, LifecycleEvent::WarmupComplete) => Active,
            (WarmingUp, LifecycleEvent::Pause { .. }) => Paused,
            (Active, LifecycleEvent::Pause { .. }) => Paused,
            (Active, LifecycleEvent::EnterClosingOnly) => ClosingOnly,
            (Active, LifecycleEvent::Halt { .. }) => Halted,
            (Paused, LifecycleEvent::Resume) => Active,
            (Paused, LifecycleEvent::EnterClosingOnly) => ClosingOnly,
            (Paused, LifecycleEvent::Halt { .. }) => Halted,
            (ClosingOnly, LifecycleEvent::Halt { .. }) => Halted,
            (Halted, LifecycleEvent::Resume) => {
                return Err(TradingError::invalid_state(
                    "CannotResumeFromHalt: resume is not accepted from Halted",
                ));
            }
            _ => {
                return Err(TradingError::invalid_state(format!(
                    "no transition for event `{}` from state {:?}",
                    event.tag(),
                    self.state
                )));
            }
        };
        self.transition(next, &event, now_ms)
    }

    fn transition(
        &mut self,
        next: StrategyState,
        event: &LifecycleEvent,
        now_ms: i64,
    ) -> Result<StrategyState, TradingError> {
        let record = TransitionRecord {
            from: self.state,
            to: next,
            event_tag: event.tag().to_string(),
            at_ms: now_ms,
        };
        if self.history.len() >= HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(record);
        self.state = next;
        self.entered_state_at_ms = now_ms;
        Ok(self.state)
    }
}
