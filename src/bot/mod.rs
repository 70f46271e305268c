//! Cycle driver.
//!
//! Connects the exchanges, runs the engine on an interval, streams every
//! cycle result as a JSON line, journals trade attempts and keeps operators
//! informed through the notifier.

mod config;
mod error;
mod stats;

pub use config::BotConfig;
pub use error::BotError;
pub use stats::Stats;

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::domain::{CycleResult, CycleStatus};
use crate::engine::{CycleEngine, EngineConfig};
use crate::exchanges::Manager;
use crate::notification::{
    ErrorData, Event, ExecutionData, NoopNotifier, Notifier, OverviewData, ShutdownData,
    StartupData, TelegramNotifier,
};
use crate::storage::{SqliteJournal, SqliteJournalConfig, TradeJournal};

/// Why the driver loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    CycleLimit,
    Interrupted,
    ExecutorDefect,
    OutputFailed,
}

impl StopReason {
    fn describe(&self) -> &'static str {
        match self {
            StopReason::CycleLimit => "cycle limit reached",
            StopReason::Interrupted => "interrupted",
            StopReason::ExecutorDefect => "executor defect",
            StopReason::OutputFailed => "output failed",
        }
    }
}

/// Final report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub uptime_ms: u64,
    pub stats: Stats,
}

impl RunSummary {
    /// Process exit code: 3 after an executor defect, 2 if any cycle failed
    /// to aggregate quotes, 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.stop_reason == StopReason::ExecutorDefect || self.stats.executor_defects > 0 {
            3
        } else if self.stats.aggregation_failures > 0 {
            2
        } else {
            0
        }
    }
}

/// Bot drives the cycle engine and its side channels.
pub struct Bot {
    settings: BotConfig,
    manager: Manager,
    engine: CycleEngine,
    notifier: Arc<dyn Notifier>,
    journal: Option<Arc<dyn TradeJournal>>,
    stats: Stats,
}

impl Bot {
    pub fn new(settings: BotConfig, manager: Manager, engine: CycleEngine) -> Self {
        Self {
            settings,
            manager,
            engine,
            notifier: Arc::new(NoopNotifier),
            journal: None,
            stats: Stats::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_journal(mut self, journal: Arc<dyn TradeJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Builds exchanges, engine, notifier and journal from configuration.
    pub async fn from_config(config: &Config, settings: BotConfig) -> Result<Self, BotError> {
        let manager = Manager::from_config(config)?;
        let mut engine_config = EngineConfig::from_config(config)?;
        if settings.scan_only {
            engine_config = engine_config.scan_only();
        }
        let engine = CycleEngine::new(manager.clients().to_vec(), engine_config);

        let mut bot = Self::new(settings, manager, engine);

        if let Some(telegram) = config
            .notification
            .as_ref()
            .and_then(|n| n.telegram.as_ref())
            .filter(|t| t.enabled)
        {
            match TelegramNotifier::new(telegram) {
                Ok(notifier) => {
                    bot = bot.with_notifier(Arc::new(notifier));
                    info!("Telegram notifier created");
                }
                Err(e) => warn!(error = %e, "failed to create Telegram notifier"),
            }
        }

        if let Some(storage) = config.storage.as_ref().filter(|s| s.enabled) {
            let mut journal_config = SqliteJournalConfig::default();
            if let Some(path) = &storage.path {
                journal_config.path = path.clone();
            }
            if let Some(max) = storage.max_connections.filter(|&n| n > 0) {
                journal_config.max_connections = max;
            }
            let journal = SqliteJournal::new(journal_config).await?;
            bot = bot.with_journal(Arc::new(journal));
        }

        Ok(bot)
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Runs cycles until the cycle limit, an executor defect or `shutdown`
    /// turns true. Each cycle result is written to `out` as one JSON line.
    ///
    /// Shutdown is only observed between cycles, so a trade in flight is
    /// always driven to a terminal state. A request raised during a cycle is
    /// honoured as soon as that cycle ends.
    pub async fn run<W: Write>(
        &mut self,
        out: &mut W,
        shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary, BotError> {
        self.manager.connect_all().await?;

        let started = Instant::now();
        info!(
            version = %self.settings.version,
            dry_run = self.settings.dry_run,
            exchanges = ?self.manager.names(),
            symbols = ?self.engine.config().symbols,
            max_cycles = self.settings.max_cycles,
            "starting cycle loop"
        );

        self.send(Event::startup(StartupData {
            version: self.settings.version.clone(),
            exchanges: self.manager.names(),
            symbols: self.engine.config().symbols.clone(),
            dry_run: self.settings.dry_run,
            scan_only: !self.engine.config().execute_trades,
        }))
        .await;

        let outcome = self.run_loop(out, shutdown, started).await;
        let stop_reason = match &outcome {
            Ok(reason) => *reason,
            Err(_) => StopReason::OutputFailed,
        };

        self.shutdown(stop_reason, started, outcome.is_ok()).await;

        let reason = outcome?;
        Ok(RunSummary {
            stop_reason: reason,
            uptime_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            stats: self.stats.clone(),
        })
    }

    async fn run_loop<W: Write>(
        &mut self,
        out: &mut W,
        mut shutdown: watch::Receiver<bool>,
        started: Instant,
    ) -> Result<StopReason, BotError> {
        let mut last_overview = Instant::now();

        loop {
            let result = self.engine.run_cycle().await;
            self.stats.record(&result);

            serde_json::to_writer(&mut *out, &result)?;
            writeln!(out)?;
            out.flush()?;

            self.journal_trades(&result).await;
            self.notify_cycle(&result);

            if result.status == CycleStatus::ExecutorDefect {
                error!(cycle_id = result.cycle_id, "executor defect, stopping");
                return Ok(StopReason::ExecutorDefect);
            }
            if self.settings.max_cycles > 0 && self.stats.cycles >= self.settings.max_cycles {
                return Ok(StopReason::CycleLimit);
            }

            if last_overview.elapsed() >= self.settings.overview_interval {
                self.send_overview(started.elapsed());
                last_overview = Instant::now();
            }

            if *shutdown.borrow_and_update() {
                return Ok(StopReason::Interrupted);
            }
            tokio::select! {
                Ok(()) = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(StopReason::Interrupted);
                    }
                }
                _ = tokio::time::sleep(self.settings.cycle_interval) => {}
            }
        }
    }

    async fn journal_trades(&self, result: &CycleResult) {
        let Some(journal) = &self.journal else {
            return;
        };
        for trade in &result.trades {
            if let Err(e) = journal.record(result.cycle_id, trade).await {
                error!(trade_id = %trade.id, error = %e, "failed to journal trade attempt");
            }
        }
    }

    fn notify_cycle(&self, result: &CycleResult) {
        for trade in &result.trades {
            self.notifier
                .send_async(Event::execution(ExecutionData::from(trade)));
        }

        for trade in result.residual_trades() {
            warn!(
                trade_id = %trade.id,
                symbol = %trade.opportunity.symbol,
                exchange = %trade.opportunity.buy_exchange,
                residual = %trade.residual_quantity,
                "residual position needs reconciliation"
            );
            self.notifier.send_async(Event::error(ErrorData {
                component: "executor".to_string(),
                message: format!(
                    "residual {} {} bought on {} was not sold",
                    trade.residual_quantity, trade.opportunity.symbol, trade.opportunity.buy_exchange
                ),
                error: trade.errors.last().map(|e| e.message.clone()),
            }));
        }

        if result.is_fatal() {
            self.notifier.send_async(Event::error(ErrorData {
                component: "engine".to_string(),
                message: format!("cycle {} ended with {:?}", result.cycle_id, result.status),
                error: result.errors.last().map(|e| e.message.clone()),
            }));
        }
    }

    fn send_overview(&self, uptime: Duration) {
        let stats = &self.stats;
        self.notifier.send_async(Event::overview(OverviewData {
            uptime,
            cycles: stats.cycles,
            aggregation_failures: stats.aggregation_failures,
            opportunities_found: stats.opportunities_found,
            trades_attempted: stats.trades_attempted,
            trades_settled: stats.trades_settled,
            trades_failed: stats.trades_failed,
            expected_profit: stats.expected_profit,
            dry_run: self.settings.dry_run,
            connections: self.manager.status(),
            health: self.engine.failure_counters().snapshot(),
        }));
    }

    async fn shutdown(&self, reason: StopReason, started: Instant, graceful: bool) {
        info!(reason = reason.describe(), cycles = self.stats.cycles, "stopping cycle loop");

        self.manager.disconnect_all().await;

        self.send(Event::shutdown(ShutdownData {
            reason: reason.describe().to_string(),
            uptime: started.elapsed(),
            graceful,
        }))
        .await;

        if let Err(e) = self.notifier.close().await {
            warn!(error = %e, "failed to close notifier");
        }
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.close().await {
                warn!(error = %e, "failed to close trade journal");
            }
        }
    }

    async fn send(&self, event: Event) {
        if let Err(e) = self.notifier.send(&event).await {
            debug!(event_type = %event.event_type, error = %e, "failed to send notification");
        }
    }
}

#[cfg(test)]
mod tests;
