use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;
use tempfile::TempDir;
use tokio::sync::watch;

use super::*;
use crate::domain::{FeeTable, OrderSide};
use crate::engine::RetryPolicy;
use crate::exchanges::mock::{MockExchange, OrderScript, QuoteScript};
use crate::exchanges::ExchangeClient;
use crate::notification::{EventType, NotificationError};

const BTC: &str = "BTC/USDT";

fn settings(max_cycles: u64) -> BotConfig {
    BotConfig {
        version: "test".to_string(),
        dry_run: false,
        scan_only: false,
        cycle_interval: Duration::from_millis(1),
        max_cycles,
        overview_interval: Duration::from_secs(3600),
    }
}

fn engine_config() -> EngineConfig {
    EngineConfig {
        symbols: vec![BTC.to_string()],
        fee_table: FeeTable::new()
            .with("x", Decimal::from(10))
            .with("y", Decimal::from(10)),
        min_profit_bps: Decimal::from(50),
        slippage_margin_bps: Decimal::from(5),
        max_results_per_symbol: 5,
        default_max_quantity: Decimal::ONE,
        fetch_timeout: Duration::from_millis(50),
        max_trades_per_cycle: 1,
        cycle_deadline: Duration::from_secs(5),
        leg_timeout: Duration::from_millis(40),
        fill_poll_interval: Duration::from_millis(5),
        retry: RetryPolicy::immediate(1),
        execute_trades: true,
    }
}

fn bot(exchanges: &[Arc<MockExchange>], settings: BotConfig) -> Bot {
    let clients: Vec<Arc<dyn ExchangeClient>> = exchanges
        .iter()
        .map(|e| Arc::clone(e) as Arc<dyn ExchangeClient>)
        .collect();
    let manager = Manager::new(clients).unwrap();
    let engine = CycleEngine::new(manager.clients().to_vec(), engine_config());
    Bot::new(settings, manager, engine)
}

/// A shutdown flag that is never raised.
fn no_shutdown() -> watch::Receiver<bool> {
    watch::channel(false).1
}

fn profitable_pair() -> (Arc<MockExchange>, Arc<MockExchange>) {
    (
        Arc::new(MockExchange::new("x").with_quote(BTC, 99, 100, 1)),
        Arc::new(MockExchange::new("y").with_quote(BTC, 102, 103, 1)),
    )
}

/// Collects the type of every event it receives.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<EventType>>,
}

impl Recorder {
    fn events(&self) -> Vec<EventType> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for Recorder {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        self.events.lock().unwrap().push(event.event_type);
        Ok(())
    }

    fn send_async(&self, event: Event) {
        self.events.lock().unwrap().push(event.event_type);
    }

    fn is_enabled(&self, _event_type: EventType) -> bool {
        true
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_cycle_limit_streams_one_json_line_per_cycle() {
    let (x, y) = profitable_pair();
    let recorder = Arc::new(Recorder::default());
    let mut bot = bot(&[x.clone(), y.clone()], settings(2)).with_notifier(recorder.clone());
    let mut out = Vec::new();

    let summary = bot.run(&mut out, no_shutdown()).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::CycleLimit);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.stats.cycles, 2);
    assert_eq!(summary.stats.trades_settled, 2);
    assert!(summary.stats.expected_profit > Decimal::ZERO);
    assert_eq!(summary.stats.best_spread_bps, Some(Decimal::from(175)));

    let lines: Vec<serde_json::Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["cycle_id"], 1);
    assert_eq!(lines[1]["cycle_id"], 2);

    let events = recorder.events();
    assert_eq!(events.first(), Some(&EventType::Startup));
    assert_eq!(events.last(), Some(&EventType::Shutdown));
    assert_eq!(events.iter().filter(|e| **e == EventType::Execution).count(), 2);
    assert!(!x.is_connected());
    assert!(!y.is_connected());
}

#[tokio::test]
async fn test_aggregation_failures_keep_looping_and_exit_two() {
    let x = Arc::new(MockExchange::new("x").with_quote_script(BTC, QuoteScript::Error));
    let y = Arc::new(MockExchange::new("y").with_quote_script(BTC, QuoteScript::Error));
    let recorder = Arc::new(Recorder::default());
    let mut bot = bot(&[x, y], settings(3)).with_notifier(recorder.clone());
    let mut out = Vec::new();

    let summary = bot.run(&mut out, no_shutdown()).await.unwrap();

    assert_eq!(summary.stats.cycles, 3);
    assert_eq!(summary.stats.aggregation_failures, 3);
    assert_eq!(summary.exit_code(), 2);
    assert_eq!(
        recorder.events().iter().filter(|e| **e == EventType::Error).count(),
        3
    );
}

#[tokio::test]
async fn test_shutdown_is_observed_between_cycles() {
    let (x, y) = profitable_pair();
    let mut config = settings(0);
    config.cycle_interval = Duration::from_secs(3600);
    let mut bot = bot(&[x.clone(), y], config);
    let mut out = Vec::new();
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let summary = bot.run(&mut out, rx).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Interrupted);
    assert_eq!(summary.stats.cycles, 1);
    assert_eq!(x.placed(OrderSide::Buy), 1);
}

#[tokio::test]
async fn test_interrupt_during_first_cycle_lets_trade_finish() {
    // The buy rests until the leg times out, so the interrupt lands while
    // the first trade is in flight.
    let x = Arc::new(
        MockExchange::new("x")
            .with_quote(BTC, 99, 100, 1)
            .with_orders(OrderSide::Buy, vec![OrderScript::NoFill]),
    );
    let y = Arc::new(MockExchange::new("y").with_quote(BTC, 102, 103, 1));
    let mut config = settings(0);
    config.cycle_interval = Duration::from_secs(3600);
    let mut bot = bot(&[x.clone(), y.clone()], config);
    let mut out = Vec::new();
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();
    });

    let summary = bot.run(&mut out, rx).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Interrupted);
    assert_eq!(summary.stats.cycles, 1);
    assert_eq!(summary.stats.trades_attempted, 1);
    assert_eq!(summary.stats.trades_settled, 1);
    assert_eq!(x.placed(OrderSide::Buy), 2);
    assert_eq!(y.placed(OrderSide::Sell), 1);
}

#[tokio::test]
async fn test_residual_trade_is_journaled_and_reported() {
    let x = Arc::new(MockExchange::new("x").with_quote(BTC, 99, 100, 1));
    let y = Arc::new(
        MockExchange::new("y")
            .with_quote(BTC, 102, 103, 1)
            .with_orders(OrderSide::Sell, vec![OrderScript::Reject; 2]),
    );
    let dir = TempDir::new().unwrap();
    let journal = Arc::new(
        SqliteJournal::new(SqliteJournalConfig {
            path: dir.path().join("trades.db").to_string_lossy().to_string(),
            max_connections: 1,
        })
        .await
        .unwrap(),
    );
    let recorder = Arc::new(Recorder::default());
    let mut bot = bot(&[x, y], settings(1))
        .with_notifier(recorder.clone())
        .with_journal(journal.clone());
    let mut out = Vec::new();

    let summary = bot.run(&mut out, no_shutdown()).await.unwrap();

    assert_eq!(summary.stats.trades_failed, 1);
    assert_eq!(summary.stats.residual_trades, 1);
    assert_eq!(summary.exit_code(), 0);
    assert!(recorder.events().contains(&EventType::Error));

    // The bot closed the journal on shutdown; reopen it to inspect.
    let reopened = SqliteJournal::new(SqliteJournalConfig {
        path: dir.path().join("trades.db").to_string_lossy().to_string(),
        max_connections: 1,
    })
    .await
    .unwrap();
    assert_eq!(reopened.count().await.unwrap(), 1);
    let residuals = reopened.residuals().await.unwrap();
    assert_eq!(residuals.len(), 1);
    assert_eq!(residuals[0].residual_quantity, Decimal::ONE);
}

#[tokio::test]
async fn test_connect_failure_aborts_run() {
    let x = Arc::new(MockExchange::new("x").with_fail_connect());
    let y = Arc::new(MockExchange::new("y"));
    let mut bot = bot(&[x, y], settings(1));
    let mut out = Vec::new();

    let result = bot.run(&mut out, no_shutdown()).await;

    assert!(matches!(result, Err(BotError::Exchange(_))));
    assert!(out.is_empty());
}

#[test]
fn test_exit_code_mapping() {
    let mut summary = RunSummary {
        stop_reason: StopReason::CycleLimit,
        uptime_ms: 0,
        stats: Stats::default(),
    };
    assert_eq!(summary.exit_code(), 0);

    summary.stats.aggregation_failures = 1;
    assert_eq!(summary.exit_code(), 2);

    summary.stop_reason = StopReason::ExecutorDefect;
    assert_eq!(summary.exit_code(), 3);
}
