//! Test fixtures shared between this crate's own tests and the
//! integration suite in `tests/`. Gated behind the `testkit` feature so it
//! never ships in a release build.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::clock::{Clock, FakeClock};
use crate::detector::SignalDetector;
use crate::error::Result;
use crate::events::EventDispatcher;
use crate::exits::ExitPipeline;
use crate::guards::GuardPipeline;
use crate::ids::{ConditionId, MarketTokenId};
use crate::journal::MemoryJournal;
use crate::market::MarketSide;
use crate::paper::PaperExecutor;
use crate::stats::StatsAccumulator;
use crate::tick::{BuiltStrategy, StrategyConfig};
use crate::ws::{ClientHooks, ClientState, WsClient};

/// A `WsClient` whose inbound traffic is scripted up front rather than
/// read off a socket. `connect` immediately delivers every queued message
/// to the hooks passed in; `send` just records the frame for inspection.
pub struct ScriptedWsClient {
    state: Mutex<ClientState>,
    script: Mutex<Vec<String>>,
    sent: Mutex<Vec<String>>,
    fail_connect: bool,
}

impl ScriptedWsClient {
    #[must_use]
    pub fn new(script: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ClientState::Closed),
            script: Mutex::new(script),
            sent: Mutex::new(Vec::new()),
            fail_connect: false,
        })
    }

    /// A client whose `connect` always fails, for reconnect-path tests.
    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ClientState::Closed),
            script: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            fail_connect: true,
        })
    }

    #[must_use]
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Push more messages onto the script for a later `connect`/`reconnect`.
    pub fn push(&self, message: impl Into<String>) {
        self.script.lock().push(message.into());
    }
}

#[async_trait]
impl WsClient for ScriptedWsClient {
    async fn connect(&self, _url: &str, hooks: ClientHooks) -> Result<()> {
        if self.fail_connect {
            return Err(crate::error::TradingError::network("scripted connect failure"));
        }
        *self.state.lock() = ClientState::Open;
        let messages = self.script.lock().drain(..).collect::<Vec<_>>();
        for message in messages {
            (hooks.on_message)(message);
        }
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<()> {
        self.sent.lock().push(frame.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.state.lock() = ClientState::Closed;
        Ok(())
    }

    fn state(&self) -> ClientState {
        *self.state.lock()
    }
}

/// A fully wired [`BuiltStrategy`] over a [`FakeClock`], [`PaperExecutor`],
/// and [`MemoryJournal`] — the shape every integration scenario starts
/// from before customizing guards, exits, or the detector.
pub fn build_test_strategy(
    detector: Arc<dyn SignalDetector>,
    entry_guards: GuardPipeline,
    exits: ExitPipeline,
) -> (BuiltStrategy, Arc<FakeClock>) {
    let clock = FakeClock::new(1_700_000_000_000);
    let config = StrategyConfig {
        condition_id: ConditionId::new("test-condition"),
        token_id: MarketTokenId::new("test-token"),
        side: MarketSide::Yes,
        warmup_ticks: 0,
        watchdog_warning_ms: 5_000,
        watchdog_critical_ms: 15_000,
        order_rate_window_ms: 60_000,
    };
    let executor = Arc::new(PaperExecutor::new(Arc::clone(&clock) as Arc<dyn Clock>));
    let journal = Arc::new(MemoryJournal::new(Arc::clone(&clock) as Arc<dyn Clock>));
    let events = Arc::new(EventDispatcher::new());
    let stats = StatsAccumulator::new();

    let mut strategy = BuiltStrategy::new(
        config,
        Arc::clone(&clock) as Arc<dyn Clock>,
        detector,
        entry_guards,
        exits,
        executor,
        journal,
        events,
        stats,
    );
    let now = clock.now_ms();
    let _ = strategy.apply_lifecycle_event(crate::lifecycle::LifecycleEvent::Initialize, now);
    let _ = strategy.apply_lifecycle_event(crate::lifecycle::LifecycleEvent::WarmupComplete, now);
    (strategy, clock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_client_replays_queued_messages_on_connect() {
        let client = ScriptedWsClient::new(vec!["{\"type\":\"heartbeat\",\"timestamp_ms\":1}".to_string()]);
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        let hooks = ClientHooks {
            on_message: Box::new(move |msg| received_clone.lock().push(msg)),
            on_close: Box::new(|| {}),
            on_error: Box::new(|_| {}),
        };
        client.connect("wss://example.invalid", hooks).await.unwrap();
        assert_eq!(received.lock().len(), 1);
        assert_eq!(client.state(), ClientState::Open);
    }

    #[tokio::test]
    async fn failing_client_returns_error_on_connect() {
        let client = ScriptedWsClient::failing();
        let hooks = ClientHooks {
            on_message: Box::new(|_| {}),
            on_close: Box::new(|| {}),
            on_error: Box::new(|_| {}),
        };
        assert!(client.connect("wss://example.invalid", hooks).await.is_err());
    }
}
