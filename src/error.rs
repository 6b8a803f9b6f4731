//! Structured error taxonomy.
//!
//! Every fallible operation in this crate returns `std::result::Result`
//! (aliased here as [`Result`]) so that `?`, `map`, `map_err`, `and_then`,
//! `unwrap_or`, `is_ok`/`is_err` all work without a bespoke combinator API —
//! the spec's §4.2 combinator list is exactly what `std::result::Result`
//! already provides.

use thiserror::Error;

/// Broad retry classification, independent of the specific error kind.
///
/// Retry logic (spec §7) consumes only this field, never the error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient; the caller may retry, honoring any `retry_after_ms`.
    Retryable,
    /// Will not succeed by retrying as-is (bad input, rejected order, auth).
    NonRetryable,
    /// Unrecoverable; the strategy lifecycle should transition to `Halted`.
    Fatal,
}

/// The crate's error type.
///
/// Carries a stable `code`, a [`ErrorCategory`], free-form `context`, and two
/// optional fields used by retry logic: a human `hint` and a `retry_after_ms`
/// (populated for `RateLimit`).
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("network error: {context}")]
    Network { context: String },

    #[error("timeout: {context}")]
    Timeout { context: String },

    #[error("rate limited, retry after {retry_after_ms}ms: {context}")]
    RateLimit { context: String, retry_after_ms: u64 },

    #[error("authentication error: {context}")]
    Auth { context: String },

    #[error("order rejected: {context}")]
    OrderRejected { context: String },

    #[error("order not found: {context}")]
    OrderNotFound { context: String },

    #[error("insufficient balance: {context}")]
    InsufficientBalance { context: String },

    #[error("configuration error: {context}")]
    Config { context: String },

    #[error("system error: {context}")]
    System { context: String },

    #[error("invalid candle: {context}")]
    InvalidCandle { context: String },

    #[error("division by zero")]
    DivByZero,

    #[error("invalid state transition: {context}")]
    InvalidState { context: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, TradingError>;

impl TradingError {
    /// The stable error code used in logs, journal entries, and events.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Timeout { .. } => "timeout",
            Self::RateLimit { .. } => "rate_limit",
            Self::Auth { .. } => "auth",
            Self::OrderRejected { .. } => "order_rejected",
            Self::OrderNotFound { .. } => "order_not_found",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::Config { .. } => "config",
            Self::System { .. } => "system",
            Self::InvalidCandle { .. } => "invalid_candle",
            Self::DivByZero => "div_by_zero",
            Self::InvalidState { .. } => "invalid_state",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::WebSocket(_) => "websocket",
            Self::Url(_) => "url",
        }
    }

    /// Retry classification, the only thing retry logic is allowed to
    /// consult (spec §7).
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network { .. } | Self::Timeout { .. } | Self::RateLimit { .. } => {
                ErrorCategory::Retryable
            }
            Self::Auth { .. }
            | Self::OrderRejected { .. }
            | Self::OrderNotFound { .. }
            | Self::InsufficientBalance { .. }
            | Self::InvalidCandle { .. }
            | Self::DivByZero
            | Self::InvalidState { .. }
            | Self::Config { .. }
            | Self::Json(_)
            | Self::Url(_) => ErrorCategory::NonRetryable,
            Self::System { .. } | Self::Io(_) | Self::WebSocket(_) => ErrorCategory::Fatal,
        }
    }

    /// Milliseconds to wait before retrying, if known.
    #[must_use]
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after_ms, .. } => Some(*retry_after_ms),
            _ => None,
        }
    }

    #[must_use]
    pub fn network(context: impl Into<String>) -> Self {
        Self::Network { context: context.into() }
    }

    #[must_use]
    pub fn timeout(context: impl Into<String>) -> Self {
        Self::Timeout { context: context.into() }
    }

    #[must_use]
    pub fn rate_limit(context: impl Into<String>, retry_after_ms: u64) -> Self {
        Self::RateLimit { context: context.into(), retry_after_ms }
    }

    #[must_use]
    pub fn config(context: impl Into<String>) -> Self {
        Self::Config { context: context.into() }
    }

    #[must_use]
    pub fn invalid_candle(context: impl Into<String>) -> Self {
        Self::InvalidCandle { context: context.into() }
    }

    #[must_use]
    pub fn div_by_zero() -> Self {
        Self::DivByZero
    }

    #[must_use]
    pub fn invalid_state(context: impl Into<String>) -> Self {
        Self::InvalidState { context: context.into() }
    }

    #[must_use]
    pub fn order_rejected(context: impl Into<String>) -> Self {
        Self::OrderRejected { context: context.into() }
    }

    /// Classify a foreign HTTP-shaped failure into the taxonomy, inspecting
    /// (in order) the structured status code, then OS error code, then
    /// message substrings — the order spec §4.2 specifies.
    #[must_use]
    pub fn classify_http(status: u16, context: impl Into<String>) -> Self {
        let context = context.into();
        match status {
            429 => Self::rate_limit(context, 1_000),
            401 | 403 => Self::Auth { context },
            500..=599 => Self::System { context },
            _ => Self::Network { context },
        }
    }

    /// Classify a raw OS error, falling back to message-substring sniffing.
    #[must_use]
    pub fn classify_os_error(err: &std::io::Error) -> Self {
        let context = err.to_string();
        match err.raw_os_error() {
            Some(code) if is_etimedout(code) => Self::timeout(context),
            Some(code) if is_econn(code) => Self::network(context),
            _ => classify_by_message(&context),
        }
    }
}

#[cfg(target_os = "linux")]
fn is_etimedout(code: i32) -> bool {
    code == 110
}
#[cfg(not(target_os = "linux"))]
fn is_etimedout(code: i32) -> bool {
    code == libc_like_etimedout()
}
#[cfg(not(target_os = "linux"))]
fn libc_like_etimedout() -> i32 {
    60
}

#[cfg(target_os = "linux")]
fn is_econn(code: i32) -> bool {
    matches!(code, 104 | 111 | 103) // ECONNRESET, ECONNREFUSED, ECONNABORTED
}
#[cfg(not(target_os = "linux"))]
fn is_econn(code: i32) -> bool {
    matches!(code, 54 | 61 | 53)
}

fn classify_by_message(msg: &str) -> TradingError {
    let lower = msg.to_ascii_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        TradingError::timeout(msg.to_string())
    } else if lower.contains("connection") || lower.contains("reset") || lower.contains("refused") {
        TradingError::network(msg.to_string())
    } else {
        TradingError::System { context: msg.to_string() }
    }
}
