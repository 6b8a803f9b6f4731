//! WS manager — the hardest subsystem (spec §4.13).
//!
//! Owns a [`WsClient`], a subscription table keyed by `channel:sortedAssets`,
//! a generation-tagged append-only message buffer, and reconnect/replay
//! semantics. Grounded on the teacher's reconnecting WS client, generalized
//! to message-generation tagging and single-flight subscription replay.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::client::{ClientHooks, ClientState, WsClient};
use super::wire::{parse_incoming, IncomingMessage, SubscribeFrame};
use crate::clock::Clock;
use crate::error::{Result, TradingError};

#[derive(Debug, Clone)]
pub struct BufferedMessage {
    pub message: IncomingMessage,
    pub generation: u64,
}

#[derive(Debug, Clone)]
struct Subscription {
    channel: String,
    assets: Vec<String>,
}

fn subscription_key(channel: &str, assets: &[String]) -> String {
    let mut sorted = assets.to_vec();
    sorted.sort();
    format!("{channel}:{}", sorted.join(","))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStatus {
    Healthy,
    Stale,
}

struct ManagerState {
    subscriptions: Vec<Subscription>,
    buffer: VecDeque<BufferedMessage>,
}

/// Exponential backoff with jitter for the outer reconnect retry loop
/// (spec §4.13 step 6, §5's "outer reconnect retry backoff" suspension
/// point). Grounded on the teacher's `core/exchange/reconnecting.rs`
/// backoff bookkeeping.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self { max_retries, base_delay_ms, max_delay_ms }
    }

    /// Delay before retry attempt `attempt` (0-based): exponential growth
    /// off `base_delay_ms`, capped at `max_delay_ms`, with up to 50% jitter
    /// so a fleet of reconnecting clients doesn't thunder the server in
    /// lockstep.
    #[must_use]
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.min(20));
        let capped = exp.min(self.max_delay_ms);
        let half = capped / 2;
        let jitter = if half == 0 { 0 } else { rand::random::<u64>() % half };
        half + jitter
    }
}

pub struct WsManager {
    client: Arc<dyn WsClient>,
    clock: Arc<dyn Clock>,
    url: String,
    max_buffer_size: usize,
    heartbeat_timeout_ms: i64,
    reconnect_policy: Mutex<Option<ReconnectPolicy>>,
    generation: AtomicU64,
    last_message_at_ms: AtomicI64,
    state: Mutex<ManagerState>,
}

impl WsManager {
    #[must_use]
    pub fn new(
        client: Arc<dyn WsClient>,
        clock: Arc<dyn Clock>,
        url: impl Into<String>,
        max_buffer_size: usize,
        heartbeat_timeout_ms: i64,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            clock,
            url: url.into(),
            max_buffer_size,
            heartbeat_timeout_ms,
            reconnect_policy: Mutex::new(None),
            generation: AtomicU64::new(0),
            last_message_at_ms: AtomicI64::new(i64::MIN),
            state: Mutex::new(ManagerState { subscriptions: Vec::new(), buffer: VecDeque::new() }),
        })
    }

    /// Attach (or replace) the retry-with-backoff policy for the outer
    /// reconnect loop. Without one, `reconnect()` attempts `connect()`
    /// exactly once.
    pub fn set_reconnect_policy(&self, policy: Option<ReconnectPolicy>) {
        *self.reconnect_policy.lock() = policy;
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn client_state(&self) -> ClientState {
        self.client.state()
    }

    fn push_message(&self, message: IncomingMessage, generation: u64) {
        let mut state = self.state.lock();
        if state.buffer.len() >= self.max_buffer_size && self.max_buffer_size > 0 {
            state.buffer.pop_front();
        }
        state.buffer.push_back(BufferedMessage { message, generation });
    }

    fn on_raw_message(self: &Arc<Self>, raw: String) {
        self.last_message_at_ms.store(self.clock.now_ms(), Ordering::SeqCst);
        if let Some(message) = parse_incoming(&raw) {
            self.push_message(message, self.generation());
        }
    }

    /// Connect the underlying client and wire its callbacks back into this
    /// manager's buffer. Increments `generation` on success.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        let this = Arc::clone(self);
        let hooks = ClientHooks {
            on_message: Box::new(move |raw| this.on_raw_message(raw)),
            on_close: Box::new(|| tracing::warn!("ws connection closed by peer")),
            on_error: Box::new(|err| tracing::warn!(error = %err, "ws connection error")),
        };
        self.client.connect(&self.url, hooks).await?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn subscribe(&self, channel: impl Into<String>, assets: Vec<String>) {
        let channel = channel.into();
        let mut state = self.state.lock();
        state.subscriptions.push(Subscription { channel, assets });
    }

    /// Emit a subscribe frame for the most recently added subscription to
    /// `channel`/`assets`.
    pub async fn send_subscribe(&self, channel: &str, assets: &[String]) -> Result<()> {
        let frame = SubscribeFrame::subscribe(channel, assets);
        let json = serde_json::to_string(&frame)?;
        self.client.send(&json).await
    }

    /// Remove every subscription table entry whose key starts with
    /// `channel:` and emit one unsubscribe frame.
    pub async fn unsubscribe(&self, channel: &str) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.subscriptions.retain(|s| s.channel != channel);
        }
        let frame = SubscribeFrame::unsubscribe(channel);
        let json = serde_json::to_string(&frame)?;
        self.client.send(&json).await
    }

    #[must_use]
    pub fn subscription_keys(&self) -> Vec<String> {
        self.state.lock().subscriptions.iter().map(|s| subscription_key(&s.channel, &s.assets)).collect()
    }

    /// Without a generation, returns and clears the entire buffer. With a
    /// generation, returns only messages tagged with it, retaining the
    /// rest.
    pub fn drain(&self, generation: Option<u64>) -> Vec<BufferedMessage> {
        let mut state = self.state.lock();
        match generation {
            None => state.buffer.drain(..).collect(),
            Some(gen) => {
                let (matching, rest): (VecDeque<_>, VecDeque<_>) =
                    state.buffer.drain(..).partition(|m| m.generation == gen);
                state.buffer = rest;
                matching.into_iter().collect()
            }
        }
    }

    #[must_use]
    pub fn check_heartbeat(&self) -> HeartbeatStatus {
        if self.heartbeat_timeout_ms < 0 {
            return HeartbeatStatus::Healthy;
        }
        let last = self.last_message_at_ms.load(Ordering::SeqCst);
        if last == i64::MIN {
            return HeartbeatStatus::Healthy;
        }
        let elapsed = self.clock.now_ms() - last;
        if elapsed > self.heartbeat_timeout_ms {
            HeartbeatStatus::Stale
        } else {
            HeartbeatStatus::Healthy
        }
    }

    /// Close, clear the buffer, reset the heartbeat timer, reconnect,
    /// increment generation, and replay every subscription — collecting
    /// per-subscription send failures rather than aborting the others.
    ///
    /// If a [`ReconnectPolicy`] is configured, a failed `connect()` is
    /// retried with its backoff up to `max_retries` times; exhausting
    /// retries surfaces the last error through the client's error hook
    /// (via `tracing::error!`, since the hook itself is only wired during a
    /// successful `connect()`) in addition to returning it.
    pub async fn reconnect(self: &Arc<Self>) -> Result<Vec<TradingError>> {
        self.client.close().await?;
        {
            let mut state = self.state.lock();
            state.buffer.clear();
        }
        self.last_message_at_ms.store(i64::MIN, Ordering::SeqCst);

        let policy = self.reconnect_policy.lock().clone();
        match policy {
            None => self.connect().await?,
            Some(policy) => {
                let mut attempt = 0;
                loop {
                    match self.connect().await {
                        Ok(()) => break,
                        Err(err) if attempt < policy.max_retries => {
                            let delay = policy.backoff_ms(attempt);
                            tracing::warn!(attempt, delay_ms = delay, error = %err, "ws reconnect attempt failed, retrying");
                            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                            attempt += 1;
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "ws reconnect exhausted retries");
                            return Err(err);
                        }
                    }
                }
            }
        }

        let subscriptions = self.state.lock().subscriptions.clone();
        let mut replay_errors = Vec::new();
        for sub in &subscriptions {
            if let Err(e) = self.send_subscribe(&sub.channel, &sub.assets).await {
                replay_errors.push(e);
            }
        }
        Ok(replay_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct ScriptedClient {
        state: Mutex<ClientState>,
        sent: Mutex<Vec<String>>,
        connect_count: AtomicUsize,
        hooks: Mutex<Option<ClientHooks>>,
    }

    #[async_trait]
    impl WsClient for ScriptedClient {
        async fn connect(&self, _url: &str, hooks: ClientHooks) -> Result<()> {
            *self.state.lock() = ClientState::Open;
            self.connect_count.fetch_add(1, Ordering::SeqCst);
            *self.hooks.lock() = Some(hooks);
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

    impl ScriptedClient {
        fn deliver(&self, raw: &str) {
            if let Some(hooks) = self.hooks.lock().as_ref() {
                (hooks.on_message)(raw.to_string());
            }
        }
    }

    fn heartbeat(ts: i64) -> String {
        format!(r#"{{"type":"heartbeat","timestampMs":{ts}}}"#)
    }

    #[tokio::test]
    async fn connect_increments_generation() {
        let client = Arc::new(ScriptedClient::default());
        let manager = WsManager::new(client, FakeClock::new(0), "wss://x", 10, 5_000);
        assert_eq!(manager.generation(), 0);
        manager.connect().await.unwrap();
        assert_eq!(manager.generation(), 1);
    }

    #[tokio::test]
    async fn reconnect_replays_all_subscriptions() {
        let client = Arc::new(ScriptedClient::default());
        let manager = WsManager::new(Arc::clone(&client) as Arc<dyn WsClient>, FakeClock::new(0), "wss://x", 10, 5_000);
        manager.connect().await.unwrap();
        manager.subscribe("book", vec!["cond-1".to_string()]);
        manager.subscribe("book", vec!["cond-2".to_string()]);
        manager.subscribe("book", vec!["cond-3".to_string()]);

        let errors = manager.reconnect().await.unwrap();
        assert!(errors.is_empty());
        assert_eq!(manager.generation(), 2);
        assert_eq!(client.sent.lock().len(), 3);
    }

    #[tokio::test]
    async fn drain_without_generation_returns_and_clears() {
        let client = Arc::new(ScriptedClient::default());
        let manager = WsManager::new(client.clone() as Arc<dyn WsClient>, FakeClock::new(0), "wss://x", 10, 5_000);
        manager.connect().await.unwrap();
        client.deliver(&heartbeat(1));
        client.deliver(&heartbeat(2));
        let drained = manager.drain(None);
        assert_eq!(drained.len(), 2);
        assert!(manager.drain(None).is_empty());
    }

    #[tokio::test]
    async fn drain_after_reconnect_excludes_old_generation_messages() {
        let client = Arc::new(ScriptedClient::default());
        let manager = WsManager::new(client.clone() as Arc<dyn WsClient>, FakeClock::new(0), "wss://x", 10, 5_000);
        manager.connect().await.unwrap();
        client.deliver(&heartbeat(1));
        manager.reconnect().await.unwrap();
        client.deliver(&heartbeat(2));
        let drained = manager.drain(None);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].generation, 2);
    }

    #[tokio::test]
    async fn heartbeat_goes_stale_after_timeout() {
        let clock = FakeClock::new(0);
        let client = Arc::new(ScriptedClient::default());
        let manager = WsManager::new(client.clone() as Arc<dyn WsClient>, clock.clone(), "wss://x", 10, 1_000);
        manager.connect().await.unwrap();
        client.deliver(&heartbeat(0));
        assert_eq!(manager.check_heartbeat(), HeartbeatStatus::Healthy);
        clock.advance(2_000);
        assert_eq!(manager.check_heartbeat(), HeartbeatStatus::Stale);
    }

    #[tokio::test]
    async fn buffer_drops_oldest_when_full() {
        let client = Arc::new(ScriptedClient::default());
        let manager = WsManager::new(client.clone() as Arc<dyn WsClient>, FakeClock::new(0), "wss://x", 2, 5_000);
        manager.connect().await.unwrap();
        client.deliver(&heartbeat(1));
        client.deliver(&heartbeat(2));
        client.deliver(&heartbeat(3));
        let drained = manager.drain(None);
        assert_eq!(drained.len(), 2);
    }

    #[tokio::test]
    async fn subscription_key_distinguishes_multi_asset_entries() {
        let client = Arc::new(ScriptedClient::default());
        let manager = WsManager::new(client as Arc<dyn WsClient>, FakeClock::new(0), "wss://x", 10, 5_000);
        manager.subscribe("book", vec!["cond-1".to_string()]);
        manager.subscribe("book", vec!["cond-2".to_string()]);
        let keys = manager.subscription_keys();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);
    }

    /// Fails `connect()` a fixed number of times before succeeding, to
    /// exercise the reconnect-policy retry loop.
    #[derive(Default)]
    struct FlakyClient {
        state: Mutex<ClientState>,
        hooks: Mutex<Option<ClientHooks>>,
        attempts: AtomicUsize,
        fail_first_n: usize,
    }

    #[async_trait]
    impl WsClient for FlakyClient {
        async fn connect(&self, _url: &str, hooks: ClientHooks) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first_n {
                return Err(TradingError::network("simulated connect failure"));
            }
            *self.state.lock() = ClientState::Open;
            *self.hooks.lock() = Some(hooks);
            Ok(())
        }
        async fn send(&self, _frame: &str) -> Result<()> {
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

    #[tokio::test]
    async fn reconnect_policy_retries_through_transient_failures() {
        let client = Arc::new(FlakyClient { fail_first_n: 2, ..Default::default() });
        let manager =
            WsManager::new(Arc::clone(&client) as Arc<dyn WsClient>, FakeClock::new(0), "wss://x", 10, 5_000);
        manager.set_reconnect_policy(Some(ReconnectPolicy::new(5, 1, 10)));

        let errors = manager.reconnect().await.unwrap();
        assert!(errors.is_empty());
        assert_eq!(client.attempts.load(Ordering::SeqCst), 2 /* failures */ + 1 /* success */);
        assert_eq!(manager.generation(), 1);
    }

    #[tokio::test]
    async fn reconnect_policy_exhausting_retries_surfaces_the_error() {
        let client = Arc::new(FlakyClient { fail_first_n: 100, ..Default::default() });
        let manager =
            WsManager::new(Arc::clone(&client) as Arc<dyn WsClient>, FakeClock::new(0), "wss://x", 10, 5_000);
        manager.set_reconnect_policy(Some(ReconnectPolicy::new(2, 1, 10)));

        let result = manager.reconnect().await;
        assert!(result.is_err());
    }
}
