//! WebSocket connectivity subsystem.

mod client;
mod manager;
mod wire;

pub use client::{ClientHooks, ClientState, TungsteniteWsClient, WsClient};
pub use manager::{BufferedMessage, HeartbeatStatus, ReconnectPolicy, WsManager};
pub use wire::{parse_incoming, IncomingMessage, PriceLevel, SubscribeFrame};
