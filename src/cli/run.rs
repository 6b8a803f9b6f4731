//! Handler for the `run` subcommand — the live tick loop.

use std::str::FromStr;
use std::sync::Arc;

use tokio::time::{interval, Duration};

use crate::clock::{Clock, SystemClock};
use crate::cli::status::StatusSnapshot;
use crate::cli::{Cli, RunArgs};
use crate::config::EngineConfig;
use crate::decimal::Decimal;
use crate::detector::EdgeThresholdDetector;
use crate::error::Result;
use crate::events::EventDispatcher;
use crate::exits::{ExitPipeline, StopLoss, TakeProfit};
use crate::guards::{Balance, DuplicateOrder, GuardPipeline, MaxPositions};
use crate::ids::{ConditionId, MarketTokenId};
use crate::journal::{FileJournal, Journal, MemoryJournal};
use crate::logging;
use crate::market::MarketSide;
use crate::paper::PaperExecutor;
use crate::stats::StatsAccumulator;
use crate::tick::{BuiltStrategy, StrategyConfig, TickContext};
use crate::ws::{HeartbeatStatus, IncomingMessage, PriceLevel, ReconnectPolicy, TungsteniteWsClient, WsManager};

/// The best bid/ask pulled off the most recent book update, with the
/// midpoint this crate uses in place of a dedicated oracle feed (spec §4.1
/// scopes out a separate oracle subsystem).
struct BestPrice {
    best_bid: Decimal,
    best_ask: Decimal,
    timestamp_ms: i64,
}

impl BestPrice {
    fn midpoint(&self) -> Decimal {
        self.best_bid
            .add(&self.best_ask)
            .div(&Decimal::from_i64(2))
            .unwrap_or_else(|_| self.best_bid.clone())
    }
}

pub async fn execute(cli: &Cli, args: &RunArgs) -> Result<()> {
    let config = EngineConfig::load(Some(cli.config.as_path()))?;
    logging::init(args.json_logs);

    if !args.no_banner {
        super::banner::print_banner();
    }

    tracing::info!(name = %config.name, paper_mode = config.paper_mode, "starting tick loop");

    let condition_id = ConditionId::new(args.condition_id.clone());
    let token_id = MarketTokenId::new(args.token_id.clone());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let client = Arc::new(TungsteniteWsClient::new());
    let manager = WsManager::new(client, Arc::clone(&clock), args.ws_url.clone(), 1_024, 30_000);
    manager.set_reconnect_policy(Some(ReconnectPolicy::new(5, 500, 30_000)));
    manager.connect().await?;
    manager.subscribe("book", vec![args.token_id.clone()]);
    manager.send_subscribe("book", &[args.token_id.clone()]).await?;

    let journal: Arc<dyn Journal> = match &args.journal_path {
        Some(path) => Arc::new(FileJournal::new(path.clone(), Arc::clone(&clock))),
        None => Arc::new(MemoryJournal::new(Arc::clone(&clock))),
    };
    let events = Arc::new(EventDispatcher::new());
    let stats = StatsAccumulator::new();

    let detector = Arc::new(EdgeThresholdDetector {
        min_edge: Decimal::from_str("0.03").unwrap_or_else(|_| Decimal::zero()),
        order_size: Decimal::from_i64(config.max_order_size_usdc as i64),
        token_id: token_id.clone(),
    });
    let entry_guards = GuardPipeline::new()
        .with(Arc::new(MaxPositions { max_positions: config.max_positions as usize }))
        .with(Arc::new(Balance { min_balance: Decimal::from_i64(10) }))
        .with(Arc::new(DuplicateOrder));
    let exits = ExitPipeline::new()
        .with(Arc::new(TakeProfit { threshold_pct: Decimal::from_str("0.10").unwrap_or_else(|_| Decimal::zero()) }))
        .with(Arc::new(StopLoss { threshold_pct: Decimal::from_str("0.05").unwrap_or_else(|_| Decimal::zero()) }));
    let executor = Arc::new(PaperExecutor::new(Arc::clone(&clock)));

    let strategy_config = StrategyConfig {
        condition_id,
        token_id,
        side: MarketSide::Yes,
        warmup_ticks: 3,
        watchdog_warning_ms: 5_000,
        watchdog_critical_ms: 15_000,
        order_rate_window_ms: 60_000,
    };

    let mut strategy = BuiltStrategy::new(
        strategy_config,
        Arc::clone(&clock),
        detector,
        entry_guards,
        exits,
        executor,
        Arc::clone(&journal),
        events,
        stats,
    );
    strategy.apply_lifecycle_event(crate::lifecycle::LifecycleEvent::Initialize, clock.now_ms())?;

    let status_path = std::path::PathBuf::from(crate::cli::status::DEFAULT_STATUS_PATH);
    let mut ticker = interval(Duration::from_millis(config.tick_interval_ms.max(1)));
    let mut last_price: Option<BestPrice> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if manager.check_heartbeat() == HeartbeatStatus::Stale {
                    tracing::warn!("ws heartbeat stale, reconnecting");
                    match manager.reconnect().await {
                        Ok(errs) if !errs.is_empty() => {
                            tracing::warn!(count = errs.len(), "some subscriptions failed to replay after reconnect");
                        }
                        Ok(_) => {}
                        Err(err) => tracing::error!(error = %err, "ws reconnect failed"),
                    }
                }

                for buffered in manager.drain(None) {
                    if let IncomingMessage::BookUpdate { bids, asks, timestamp_ms, .. } = buffered.message {
                        if let Some(price) = best_price(&bids, &asks, timestamp_ms) {
                            last_price = Some(price);
                        }
                    }
                }

                if let Some(price) = &last_price {
                    if !args.dry_run {
                        let ctx = TickContext {
                            now_ms: clock.now_ms(),
                            oracle_price: price.midpoint(),
                            spot: price.midpoint(),
                            best_bid: price.best_bid.clone(),
                            best_ask: price.best_ask.clone(),
                            book_age_ms: Some((clock.now_ms() - price.timestamp_ms).max(0)),
                            time_remaining_ms: i64::MAX,
                            available_balance: Decimal::from_i64(config.max_order_size_usdc as i64 * 10),
                            daily_pnl: strategy.positions().realized_pnl_total().clone(),
                        };
                        if let Err(err) = strategy.tick(&ctx).await {
                            tracing::error!(error = %err, "tick failed");
                        }
                    }
                }

                let snapshot = StatusSnapshot {
                    pid: std::process::id(),
                    updated_at: chrono::Utc::now(),
                    lifecycle_state: format!("{:?}", strategy.lifecycle_state()),
                    open_position_count: strategy.positions().open_positions().len(),
                    trade_count: strategy.stats().snapshot().trade_count,
                    win_rate: strategy.stats().snapshot().win_rate,
                    realized_pnl_total: strategy.positions().realized_pnl_total().to_display_string(),
                };
                let _ = snapshot.write(&status_path);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    strategy.apply_lifecycle_event(crate::lifecycle::LifecycleEvent::Shutdown, clock.now_ms())?;
    journal.close().await?;
    Ok(())
}

fn best_price(bids: &[PriceLevel], asks: &[PriceLevel], timestamp_ms: i64) -> Option<BestPrice> {
    let best_bid = bids.first().and_then(|l| Decimal::from_str(&l.price).ok())?;
    let best_ask = asks.first().and_then(|l| Decimal::from_str(&l.price).ok())?;
    Some(BestPrice { best_bid, best_ask, timestamp_ms })
}
