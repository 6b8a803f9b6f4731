//! Structured logging setup.
//!
//! Grounded on the teacher's `tracing`/`tracing-subscriber` bootstrap:
//! `RUST_LOG`-driven env filter, JSON output when stdout is not a TTY (or
//! when explicitly requested), human-readable otherwise.

use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber. Safe to call once at
/// process start; a second call is a no-op save for a warning.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already initialized: {e}");
    }
}
