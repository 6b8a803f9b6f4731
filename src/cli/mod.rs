//! Command-line interface definitions.

pub mod backtest;
pub mod banner;
pub mod journal;
pub mod run;
pub mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// tickforge - core tick pipeline for a binary-market trading engine.
#[derive(Parser, Debug)]
#[command(name = "tickforge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Override log level (passed through to RUST_LOG if set)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the tick loop against a websocket feed
    Run(RunArgs),

    /// Show current lifecycle state, open positions, and stats
    Status,

    /// Inspect a JSONL journal file
    Journal(JournalArgs),

    /// Replay a candle series through the backtester
    Backtest(BacktestArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Skip the startup banner
    #[arg(long)]
    pub no_banner: bool,

    /// Use JSON log format instead of pretty
    #[arg(long)]
    pub json_logs: bool,

    /// Detect signals and evaluate guards but never submit orders
    #[arg(long)]
    pub dry_run: bool,

    /// Websocket URL to connect to for book updates
    #[arg(long, default_value = "wss://ws-subscriptions-clob.polymarket.com/ws/market")]
    pub ws_url: String,

    /// Condition id of the market to trade
    #[arg(long)]
    pub condition_id: String,

    /// Token id of the side being traded
    #[arg(long)]
    pub token_id: String,

    /// Path to the JSONL journal file (in-memory journal if omitted)
    #[arg(long)]
    pub journal_path: Option<PathBuf>,
}

/// Arguments for the `journal` subcommand.
#[derive(Parser, Debug)]
pub struct JournalArgs {
    #[command(subcommand)]
    pub command: JournalCommands,
}

#[derive(Subcommand, Debug)]
pub enum JournalCommands {
    /// Restore a journal file and print every entry, plus any corrupt lines
    Inspect {
        /// Path to the JSONL journal file
        path: PathBuf,
    },
}

/// Arguments for the `backtest` subcommand.
#[derive(Parser, Debug)]
pub struct BacktestArgs {
    /// Path to a JSON array of candles
    pub candles: PathBuf,

    /// Minimum edge the detector requires to fire
    #[arg(long, default_value = "0.05")]
    pub min_edge: String,

    /// Order size placed on entry
    #[arg(long, default_value = "10")]
    pub order_size: String,

    /// Take-profit threshold as a fraction of entry price
    #[arg(long, default_value = "0.10")]
    pub take_profit: String,

    /// Available balance for the Balance guard context
    #[arg(long, default_value = "10000")]
    pub balance: String,

    /// Condition id to attribute the backtest to
    #[arg(long, default_value = "backtest")]
    pub condition_id: String,

    /// Token id to attribute the backtest to
    #[arg(long, default_value = "backtest-token")]
    pub token_id: String,
}
