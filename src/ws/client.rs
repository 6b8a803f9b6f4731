//! WS client abstraction and a `tokio-tungstenite`-backed implementation.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Result, TradingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Closed,
    Connecting,
    Open,
    Closing,
}

/// Callbacks a `WsClient` implementation invokes on inbound traffic. Kept
/// as boxed closures rather than an associated trait to keep `WsClient`
/// object-safe.
pub struct ClientHooks {
    pub on_message: Box<dyn Fn(String) + Send + Sync>,
    pub on_close: Box<dyn Fn() + Send + Sync>,
    pub on_error: Box<dyn Fn(String) + Send + Sync>,
}

#[async_trait]
pub trait WsClient: Send + Sync {
    async fn connect(&self, url: &str, hooks: ClientHooks) -> Result<()>;
    async fn send(&self, frame: &str) -> Result<()>;
    async fn close(&self) -> Result<()>;
    fn state(&self) -> ClientState;
}

/// A real `tokio-tungstenite` client over TLS via `rustls`.
pub struct TungsteniteWsClient {
    state: Mutex<ClientState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl Default for TungsteniteWsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TungsteniteWsClient {
    #[must_use]
    pub fn new() -> Self {
        Self { state: Mutex::new(ClientState::Closed), outbound: Mutex::new(None) }
    }
}

#[async_trait]
impl WsClient for TungsteniteWsClient {
    async fn connect(&self, url: &str, hooks: ClientHooks) -> Result<()> {
        *self.state.lock() = ClientState::Connecting;
        let url = url::Url::parse(url)?;
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(TradingError::from)?;
        *self.state.lock() = ClientState::Open;

        let (mut write, mut read) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.outbound.lock() = Some(tx);

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let state = Arc::new(Mutex::new(ClientState::Open));
        let state_for_task = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(item) = read.next().await {
                match item {
                    Ok(Message::Text(text)) => (hooks.on_message)(text.to_string()),
                    Ok(Message::Close(_)) => {
                        *state_for_task.lock() = ClientState::Closed;
                        (hooks.on_close)();
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        (hooks.on_error)(e.to_string());
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<()> {
        let sender = self.outbound.lock().clone();
        match sender {
            Some(tx) => tx
                .send(Message::Text(frame.to_string().into()))
                .map_err(|e| TradingError::network(format!("ws send failed: {e}"))),
            None => Err(TradingError::network("ws client is not connected")),
        }
    }

    async fn close(&self) -> Result<()> {
        *self.state.lock() = ClientState::Closing;
        self.outbound.lock().take();
        *self.state.lock() = ClientState::Closed;
        Ok(())
    }

    fn state(&self) -> ClientState {
        *self.state.lock()
    }
}
