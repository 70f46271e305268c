use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{TradeAttempt, TradeOutcome};
use crate::engine::ExchangeHealth;

/// Kind of notification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// A trade attempt reached a terminal outcome.
    Execution,
    /// Fatal cycle or residual position.
    Error,
    Startup,
    Shutdown,
    /// Periodic statistics overview.
    Overview,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Execution => write!(f, "execution"),
            EventType::Error => write!(f, "error"),
            EventType::Startup => write!(f, "startup"),
            EventType::Shutdown => write!(f, "shutdown"),
            EventType::Overview => write!(f, "overview"),
        }
    }
}

/// Outcome of one trade attempt.
#[derive(Debug, Clone)]
pub struct ExecutionData {
    pub symbol: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub outcome: TradeOutcome,
    pub expected_spread_bps: Decimal,
    /// Profit implied by the expected spread at the opportunity's size.
    pub expected_profit: Decimal,
    pub bought_quantity: Decimal,
    pub sold_quantity: Decimal,
    pub residual_quantity: Decimal,
    pub execution_time: Duration,
    /// Last error recorded on the attempt, if any.
    pub error_message: Option<String>,
}

impl From<&TradeAttempt> for ExecutionData {
    fn from(attempt: &TradeAttempt) -> Self {
        let execution_time = attempt
            .finished_at
            .and_then(|at| (at - attempt.started_at).to_std().ok())
            .unwrap_or(Duration::ZERO);
        Self {
            symbol: attempt.opportunity.symbol.clone(),
            buy_exchange: attempt.opportunity.buy_exchange.clone(),
            sell_exchange: attempt.opportunity.sell_exchange.clone(),
            outcome: attempt.outcome,
            expected_spread_bps: attempt.opportunity.expected_spread_bps,
            expected_profit: attempt.opportunity.expected_profit(),
            bought_quantity: attempt.bought_quantity,
            sold_quantity: attempt.sold_quantity,
            residual_quantity: attempt.residual_quantity,
            execution_time,
            error_message: attempt.errors.last().map(|e| e.message.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorData {
    pub component: String,
    pub message: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartupData {
    pub version: String,
    pub exchanges: Vec<String>,
    pub symbols: Vec<String>,
    pub dry_run: bool,
    pub scan_only: bool,
}

#[derive(Debug, Clone)]
pub struct ShutdownData {
    pub reason: String,
    pub uptime: Duration,
    pub graceful: bool,
}

/// Periodic overview of the run so far.
#[derive(Debug, Clone)]
pub struct OverviewData {
    pub uptime: Duration,
    pub cycles: u64,
    pub aggregation_failures: u64,
    pub opportunities_found: u64,
    pub trades_attempted: u64,
    pub trades_settled: u64,
    pub trades_failed: u64,
    pub expected_profit: Decimal,
    pub dry_run: bool,
    /// Connection state per exchange.
    pub connections: BTreeMap<String, bool>,
    /// Fetch failure counters per exchange.
    pub health: BTreeMap<String, ExchangeHealth>,
}

#[derive(Debug, Clone)]
pub enum EventData {
    Execution(ExecutionData),
    Error(ErrorData),
    Startup(StartupData),
    Shutdown(ShutdownData),
    Overview(OverviewData),
}

/// Notification event.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    pub fn new(event_type: EventType, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn execution(data: ExecutionData) -> Self {
        Self::new(EventType::Execution, EventData::Execution(data))
    }

    pub fn error(data: ErrorData) -> Self {
        Self::new(EventType::Error, EventData::Error(data))
    }

    pub fn startup(data: StartupData) -> Self {
        Self::new(EventType::Startup, EventData::Startup(data))
    }

    pub fn shutdown(data: ShutdownData) -> Self {
        Self::new(EventType::Shutdown, EventData::Shutdown(data))
    }

    pub fn overview(data: OverviewData) -> Self {
        Self::new(EventType::Overview, EventData::Overview(data))
    }
}

/// Delivers notification events to an operator channel.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Sends an event and waits for delivery.
    async fn send(&self, event: &Event) -> Result<(), NotificationError>;

    /// Queues an event without waiting.
    fn send_async(&self, event: Event);

    /// Returns true if events of this type are delivered.
    fn is_enabled(&self, event_type: EventType) -> bool;

    /// Flushes queued events and releases resources.
    async fn close(&self) -> Result<(), NotificationError>;
}

/// Notification errors.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("invalid notifier config: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("{0}")]
    Multiple(String),
}

/// MultiNotifier fans events out to several notifiers.
pub struct MultiNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

fn join_errors(errors: Vec<NotificationError>) -> Result<(), NotificationError> {
    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        Err(NotificationError::Multiple(messages.join("; ")))
    }
}

#[async_trait::async_trait]
impl Notifier for MultiNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                if let Err(e) = notifier.send(event).await {
                    errors.push(e);
                }
            }
        }
        join_errors(errors)
    }

    fn send_async(&self, event: Event) {
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                notifier.send_async(event.clone());
            }
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.notifiers.iter().any(|n| n.is_enabled(event_type))
    }

    async fn close(&self) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if let Err(e) = notifier.close().await {
                errors.push(e);
            }
        }
        join_errors(errors)
    }
}

/// NoopNotifier drops every event.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _event: &Event) -> Result<(), NotificationError> {
        Ok(())
    }

    fn send_async(&self, _event: Event) {}

    fn is_enabled(&self, _event_type: EventType) -> bool {
        false
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

// === Formatting ===

pub fn format_execution(data: &ExecutionData) -> String {
    let header = match data.outcome {
        TradeOutcome::Filled => "✅ *Trade filled*",
        TradeOutcome::PartiallyFilled => "☑️ *Trade partially filled*",
        TradeOutcome::Failed => "❌ *Trade failed*",
        TradeOutcome::Aborted => "⏹ *Trade aborted*",
        TradeOutcome::Pending => "⏳ *Trade pending*",
    };
    let base = parse_pair_base(&data.symbol);
    let residual = if data.residual_quantity > Decimal::ZERO {
        format!("\n⚠️ Residual: *{} {}*", data.residual_quantity, base)
    } else {
        String::new()
    };
    let error = data
        .error_message
        .as_ref()
        .map(|e| format!("\nLast error: {}", e))
        .unwrap_or_default();

    format!(
        "{}\n\n\
         Pair: {} #{}\n\
         {} → {}\n\
         Expected spread: *{} bps* (${})\n\
         Bought: {} {}\n\
         Sold: {} {}{}{}\n\
         Execution time: {}\n\n\
         ⏰ {}",
        header,
        data.symbol,
        format_pair_tag(&data.symbol),
        data.buy_exchange,
        data.sell_exchange,
        data.expected_spread_bps.round_dp(2),
        data.expected_profit.round_dp(2),
        data.bought_quantity,
        base,
        data.sold_quantity,
        base,
        residual,
        error,
        format_duration(data.execution_time),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_error(data: &ErrorData) -> String {
    let error_str = data
        .error
        .as_ref()
        .map(|e| format!("\nError: {}", e))
        .unwrap_or_default();

    format!(
        "⚠️ *Error*\n\n\
         Component: {}\n\
         Message: {}{}\n\n\
         ⏰ {}",
        data.component,
        data.message,
        error_str,
        Utc::now().format("%H:%M:%S UTC")
    )
}

fn format_mode(dry_run: bool, scan_only: bool) -> &'static str {
    match (dry_run, scan_only) {
        (_, true) => "🔍 SCAN ONLY",
        (true, false) => "🧪 DRY RUN",
        (false, false) => "🚀 LIVE",
    }
}

pub fn format_startup(data: &StartupData) -> String {
    format!(
        "🤖 *Engine started*\n\n\
         Version: {}\n\
         Mode: {}\n\
         Exchanges: {}\n\
         Pairs: {}\n\n\
         ⏰ {}",
        data.version,
        format_mode(data.dry_run, data.scan_only),
        data.exchanges.join(", "),
        data.symbols.join(", "),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_shutdown(data: &ShutdownData) -> String {
    let status = if data.graceful {
        "✅ Graceful"
    } else {
        "⚠️ Forced"
    };

    format!(
        "🛑 *Engine stopped*\n\n\
         Reason: {}\n\
         Status: {}\n\
         Uptime: {}\n\n\
         ⏰ {}",
        data.reason,
        status,
        format_duration(data.uptime),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_overview(data: &OverviewData) -> String {
    let mut exchanges = String::new();
    for (name, connected) in &data.connections {
        let marker = if *connected { "🟢" } else { "🔴" };
        let failures = data
            .health
            .get(name)
            .map(|h| h.consecutive_failures)
            .unwrap_or(0);
        exchanges.push_str(&format!("\n{} {} (failing: {})", marker, name, failures));
    }

    format!(
        "📊 *Overview* {}\n\n\
         ⏱ Uptime: {}\n\
         🔄 Cycles: {} ({} without quotes)\n\n\
         📈 Opportunities: {}\n\
         ✅ Settled trades: {}/{}\n\
         ❌ Failed: {}\n\n\
         💰 Expected profit: *${}*\n\n\
         Exchanges:{}\n\n\
         ⏰ {}",
        format_mode(data.dry_run, false),
        format_duration(data.uptime),
        add_thousand_separators(data.cycles),
        data.aggregation_failures,
        add_thousand_separators(data.opportunities_found),
        data.trades_settled,
        data.trades_attempted,
        data.trades_failed,
        data.expected_profit.round_dp(2),
        exchanges,
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_event(event: &Event) -> String {
    match &event.data {
        EventData::Execution(data) => format_execution(data),
        EventData::Error(data) => format_error(data),
        EventData::Startup(data) => format_startup(data),
        EventData::Shutdown(data) => format_shutdown(data),
        EventData::Overview(data) => format_overview(data),
    }
}

// === Helpers ===

/// Base currency of a pair ("BTC" for "BTC/USDT").
fn parse_pair_base(pair: &str) -> &str {
    pair.split('/').next().unwrap_or(pair)
}

/// Hashtag form of a pair; the underscore is escaped for Telegram Markdown.
fn format_pair_tag(pair: &str) -> String {
    pair.replace('/', "\\_")
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

fn add_thousand_separators(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
