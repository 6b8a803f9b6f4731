//! tickforge - core tick pipeline for a binary-market trading engine.
//!
//! The crate is organized around one operation, [`tick::BuiltStrategy::tick`],
//! that fuses a connectivity watchdog, a strategy lifecycle FSM, an entry
//! guard pipeline, an exit policy pipeline, a signal detector, an order
//! registry, and a position manager into a single per-tick call. Everything
//! else — the websocket subsystem, the journal, the paper executor, the
//! backtester, the CLI — is a collaborator behind a trait, swappable in
//! tests and in the `backtest` replay path.
//!
//! # Features
//!
//! - `testkit` - expose [`testkit`], a set of fixtures (`ScriptedWsClient`,
//!   canned candle series, a pre-wired `BuiltStrategy` builder) for
//!   integration tests outside this crate.

pub mod backtest;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod decimal;
pub mod detector;
pub mod error;
pub mod events;
pub mod executor;
pub mod exits;
pub mod guards;
pub mod ids;
pub mod journal;
pub mod lifecycle;
pub mod logging;
pub mod market;
pub mod paper;
pub mod position;
pub mod registry;
pub mod stats;
pub mod tick;
pub mod watchdog;
pub mod ws;

#[cfg(feature = "testkit")]
pub mod testkit;
