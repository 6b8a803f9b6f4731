//! WS wire frame schema.
//!
//! Spec §6: strict validation per `type`; anything structurally invalid is
//! dropped rather than buffered.

use serde::{Deserialize, Serialize};

/// An outgoing subscribe/unsubscribe frame.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeFrame<'a> {
    pub action: &'static str,
    pub channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<&'a [String]>,
}

impl<'a> SubscribeFrame<'a> {
    #[must_use]
    pub fn subscribe(channel: &'a str, assets: &'a [String]) -> Self {
        Self { action: "subscribe", channel, assets: Some(assets) }
    }

    #[must_use]
    pub fn unsubscribe(channel: &'a str) -> Self {
        Self { action: "unsubscribe", channel, assets: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceLevel {
    pub price: String,
    pub size: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    BookUpdate {
        #[serde(rename = "conditionId")]
        condition_id: String,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        #[serde(rename = "timestampMs")]
        timestamp_ms: i64,
    },
    UserFill {
        #[serde(rename = "orderId")]
        order_id: String,
        #[serde(rename = "filledSize")]
        filled_size: String,
        #[serde(rename = "fillPrice")]
        fill_price: String,
        #[serde(rename = "timestampMs")]
        timestamp_ms: i64,
    },
    UserOrderStatus {
        #[serde(rename = "orderId")]
        order_id: String,
        status: String,
        #[serde(rename = "timestampMs")]
        timestamp_ms: i64,
    },
    Heartbeat {
        #[serde(rename = "timestampMs")]
        timestamp_ms: i64,
    },
}

/// Validate and parse a raw message string. Returns `None` for anything
/// structurally invalid or of an unknown `type` — such messages are
/// dropped, never buffered.
#[must_use]
pub fn parse_incoming(raw: &str) -> Option<IncomingMessage> {
    serde_json::from_str(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_book_update() {
        let raw = r#"{"type":"book_update","conditionId":"c1","bids":[{"price":"0.5","size":"10"}],"asks":[],"timestampMs":100}"#;
        assert!(matches!(parse_incoming(raw), Some(IncomingMessage::BookUpdate { .. })));
    }

    #[test]
    fn parses_heartbeat() {
        let raw = r#"{"type":"heartbeat","timestampMs":100}"#;
        assert!(matches!(parse_incoming(raw), Some(IncomingMessage::Heartbeat { .. })));
    }

    #[test]
    fn unknown_type_is_dropped() {
        let raw = r#"{"type":"something_else","timestampMs":100}"#;
        assert!(parse_incoming(raw).is_none());
    }

    #[test]
    fn structurally_invalid_json_is_dropped() {
        assert!(parse_incoming("not json at all").is_none());
    }

    #[test]
    fn missing_required_field_is_dropped() {
        let raw = r#"{"type":"user_fill","orderId":"o1"}"#;
        assert!(parse_incoming(raw).is_none());
    }

    #[test]
    fn subscribe_frame_serializes_with_assets() {
        let assets = vec!["cond-1".to_string()];
        let frame = SubscribeFrame::subscribe("book", &assets);
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"action\":\"subscribe\""));
        assert!(json.contains("cond-1"));
    }

    #[test]
    fn unsubscribe_frame_omits_assets() {
        let frame = SubscribeFrame::unsubscribe("book");
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("assets"));
    }
}
