//! Integration tests mirroring the six concrete end-to-end scenarios:
//! happy-path trade, guard short-circuit, reconnect replay, journal
//! corruption, kill-switch auto-engage, and handler resilience. Each
//! drives the crate through its public API rather than reaching into a
//! module's own unit tests, the way the teacher's top-level `tests/`
//! suite exercises the crate from outside.

mod support;

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::tempdir;

use tickforge::clock::FakeClock;
use tickforge::decimal::Decimal;
use tickforge::detector::EdgeThresholdDetector;
use tickforge::events::{EventDispatcher, EventNamespace};
use tickforge::exits::{ExitPipeline, TakeProfit};
use tickforge::guards::{EntryGuard, GuardPipeline, KillSwitch, KillSwitchMode, MaxPositions, MaxSpread};
use tickforge::ids::MarketTokenId;
use tickforge::journal::{FileJournal, Journal};
use tickforge::testkit::build_test_strategy;
use tickforge::tick::TickContext;

use support::scenario::{guard_ctx, CounterSpy};

#[tokio::test]
async fn happy_path_trade_opens_on_entry_and_closes_on_take_profit() {
    let token_id = MarketTokenId::new("yes-token");
    let detector = Arc::new(EdgeThresholdDetector {
        min_edge: Decimal::from_str("0.05").unwrap(),
        order_size: Decimal::from_str("10").unwrap(),
        token_id: token_id.clone(),
    });
    let exits = ExitPipeline::new().with(Arc::new(TakeProfit { threshold_pct: Decimal::from_str("0.10").unwrap() }));
    let (mut strategy, clock) = build_test_strategy(detector, GuardPipeline::new(), exits);

    let t1 = TickContext {
        now_ms: clock.now_ms(),
        oracle_price: Decimal::from_str("0.60").unwrap(),
        spot: Decimal::from_str("0.51").unwrap(),
        best_bid: Decimal::from_str("0.49").unwrap(),
        best_ask: Decimal::from_str("0.51").unwrap(),
        book_age_ms: Some(0),
        time_remaining_ms: 60_000,
        available_balance: Decimal::from_str("1000").unwrap(),
        daily_pnl: Decimal::zero(),
    };
    strategy.tick(&t1).await.unwrap();
    assert_eq!(strategy.positions().open_positions().len(), 1);
    let entry_price = strategy.positions().open_positions()[0].average_entry_price.clone();
    assert!(entry_price.eq_to(&Decimal::from_str("0.51").unwrap()));

    clock.advance(1_000);
    let t2 = TickContext {
        now_ms: clock.now_ms(),
        best_bid: Decimal::from_str("0.60").unwrap(),
        best_ask: Decimal::from_str("0.61").unwrap(),
        oracle_price: Decimal::from_str("0.60").unwrap(),
        spot: Decimal::from_str("0.60").unwrap(),
        ..t1
    };
    strategy.tick(&t2).await.unwrap();

    assert!(strategy.positions().open_positions().is_empty());
    let closed = strategy.positions().closed_positions();
    assert_eq!(closed.len(), 1);
    assert!(closed[0].realized_pnl.gt(&Decimal::zero()));
}

#[tokio::test]
async fn guard_short_circuit_stops_before_max_positions() {
    let spy_calls = Arc::new(AtomicUsize::new(0));
    let pipeline = GuardPipeline::new()
        .with(Arc::new(MaxSpread { max_spread_pct: Decimal::from_str("0.01").unwrap() }))
        .with(Arc::new(CounterSpy(Arc::clone(&spy_calls))))
        .with(Arc::new(MaxPositions { max_positions: 5 }));

    let mut ctx = guard_ctx();
    ctx.spread_pct = Decimal::from_str("0.05").unwrap();

    let decision = pipeline.evaluate(&ctx);
    assert!(!decision.is_allow());
    match decision {
        tickforge::guards::GuardDecision::Block { guard_name, .. } => assert_eq!(guard_name, "MaxSpread"),
        tickforge::guards::GuardDecision::Allow => panic!("expected a block"),
    }
    assert_eq!(spy_calls.load(Ordering::SeqCst), 0, "guard after the blocker must never run");
}

#[tokio::test]
async fn reconnect_replays_every_subscribed_channel() {
    use tickforge::testkit::ScriptedWsClient;
    use tickforge::ws::WsManager;

    let client = ScriptedWsClient::new(Vec::new());
    let clock: Arc<dyn tickforge::clock::Clock> = FakeClock::new(0);
    let manager = WsManager::new(client.clone(), clock, "wss://example.invalid", 256, 30_000);
    manager.connect().await.unwrap();

    for cond in ["cond-1", "cond-2", "cond-3"] {
        manager.subscribe("book", vec![cond.to_string()]);
        manager.send_subscribe("book", &[cond.to_string()]).await.unwrap();
    }

    let generation_before = manager.generation();
    let errors = manager.reconnect().await.unwrap();
    assert!(errors.is_empty());
    assert_eq!(manager.generation(), generation_before + 1);
    assert!(manager.drain(None).is_empty());

    let frames = client.sent_frames();
    for cond in ["cond-1", "cond-2", "cond-3"] {
        assert!(frames.iter().any(|f| f.contains(cond)), "missing replayed subscribe for {cond}");
    }
}

#[tokio::test]
async fn journal_corruption_surfaces_without_dropping_valid_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let clock: Arc<dyn tickforge::clock::Clock> = FakeClock::new(0);

    let journal = FileJournal::new(path.clone(), Arc::clone(&clock));
    journal.record("order_placed", serde_json::json!({"n": "A"})).await.unwrap();

    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(file, "not-valid-json").unwrap();
    writeln!(file, "{{broken").unwrap();
    drop(file);

    let journal = FileJournal::new(path, Arc::clone(&clock));
    journal.record("order_placed", serde_json::json!({"n": "B"})).await.unwrap();

    let report = journal.restore().await.unwrap();
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.corrupt.len(), 2);
}

#[test]
fn kill_switch_auto_engages_full_mode_on_hard_breach() {
    let guard = KillSwitch::new(
        Decimal::from_str("0.03").unwrap(),
        Decimal::from_str("0.05").unwrap(),
        Decimal::from_str("1000").unwrap(),
    );
    let mut ctx = guard_ctx();
    ctx.daily_pnl = Decimal::from_str("-60").unwrap();

    let decision = guard.check(&ctx);
    match decision {
        tickforge::guards::GuardDecision::Block { recoverable, .. } => assert!(!recoverable),
        tickforge::guards::GuardDecision::Allow => panic!("expected the kill switch to block"),
    }
    assert_eq!(guard.mode(), KillSwitchMode::Full);
}

#[test]
fn second_handler_runs_exactly_once_after_the_first_panics() {
    let dispatcher = EventDispatcher::new();
    let second_calls = Arc::new(AtomicUsize::new(0));
    let second_calls_clone = Arc::clone(&second_calls);
    let observed_errors = Arc::new(std::sync::Mutex::new(Vec::new()));
    let observed_errors_clone = Arc::clone(&observed_errors);

    dispatcher.on_handler_error(move |event_name, message| {
        observed_errors_clone.lock().unwrap().push((event_name.to_string(), message.to_string()));
    });
    dispatcher.subscribe(EventNamespace::Domain, "order_placed", |_, _| {
        panic!("first handler always fails");
    });
    dispatcher.subscribe(EventNamespace::Domain, "order_placed", move |_, _| {
        second_calls_clone.fetch_add(1, Ordering::SeqCst);
    });

    dispatcher.publish(EventNamespace::Domain, "order_placed", &serde_json::json!({}));

    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    let errors = observed_errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "order_placed");
    assert_eq!(errors[0].1, "first handler always fails");
}
