//! Handler for the `backtest` subcommand.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::backtest::Backtester;
use crate::cli::BacktestArgs;
use crate::decimal::Decimal;
use crate::detector::EdgeThresholdDetector;
use crate::error::{Result, TradingError};
use crate::exits::{ExitPipeline, TakeProfit};
use crate::guards::GuardPipeline;
use crate::ids::{ConditionId, MarketTokenId};
use crate::market::{Candle, MarketSide};

pub async fn execute(args: &BacktestArgs) -> Result<()> {
    let candles = load_candles(&args.candles)?;
    let token_id = MarketTokenId::new(args.token_id.clone());

    let min_edge = Decimal::from_str(&args.min_edge)
        .map_err(|_| TradingError::config("--min-edge is not a valid decimal"))?;
    let order_size = Decimal::from_str(&args.order_size)
        .map_err(|_| TradingError::config("--order-size is not a valid decimal"))?;
    let take_profit = Decimal::from_str(&args.take_profit)
        .map_err(|_| TradingError::config("--take-profit is not a valid decimal"))?;
    let balance = Decimal::from_str(&args.balance)
        .map_err(|_| TradingError::config("--balance is not a valid decimal"))?;

    let detector = Arc::new(EdgeThresholdDetector { min_edge, order_size, token_id: token_id.clone() });
    let exits = ExitPipeline::new().with(Arc::new(TakeProfit { threshold_pct: take_profit }));

    let mut backtester = Backtester::new(
        ConditionId::new(args.condition_id.clone()),
        token_id,
        MarketSide::Yes,
        detector,
        GuardPipeline::new(),
        exits,
        balance,
    );

    let report = backtester.run(&candles).await?;

    println!();
    println!("Candles replayed:   {}", candles.len());
    println!("Closed positions:   {}", report.closed_positions.len());
    println!("Trade count:        {}", report.stats.trade_count);
    println!("Win rate:           {:.1}%", report.stats.win_rate * 100.0);
    println!("Max drawdown:       {:.4}", report.stats.max_drawdown);
    println!("Total fees:         {:.4}", report.stats.total_fees);
    if let Some(last) = report.equity_curve.last() {
        println!("Final realized PnL: {:.4}", last.realized_pnl_total);
    }
    println!();

    Ok(())
}

fn load_candles(path: &Path) -> Result<Vec<Candle>> {
    let raw = fs::read_to_string(path)?;
    let rows: Vec<RawCandle> = serde_json::from_str(&raw)?;
    rows.into_iter().map(RawCandle::into_candle).collect()
}

#[derive(serde::Deserialize)]
struct RawCandle {
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
    timestamp_ms: i64,
}

impl RawCandle {
    fn into_candle(self) -> Result<Candle> {
        let parse = |s: &str| {
            Decimal::from_str(s).map_err(|_| TradingError::invalid_candle("candle field is not a valid decimal"))
        };
        Candle::try_new(
            parse(&self.open)?,
            parse(&self.high)?,
            parse(&self.low)?,
            parse(&self.close)?,
            parse(&self.volume)?,
            self.timestamp_ms,
        )
    }
}
