//! Fetch, scan and execute pipeline.
//!
//! One call to [`CycleEngine::run_cycle`] collects a snapshot per symbol,
//! scans them for cross-exchange spreads and executes the best ones one at a
//! time until the trade cap or the cycle deadline is reached.

mod aggregator;
mod config;
mod error;
mod executor;
mod retry;
mod scanner;

pub use aggregator::{ExchangeHealth, FailureCounters, PriceAggregator, SnapshotSet};
pub use config::EngineConfig;
pub use error::EngineError;
pub use executor::TradeExecutor;
pub use retry::{Backoff, RetryPolicy};
pub use scanner::{ScanParams, scan, scan_all};

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::domain::{CycleResult, CycleStatus, ErrorRecord};
use crate::exchanges::ExchangeClient;

/// CycleEngine owns the pipeline components and runs cycles on demand.
pub struct CycleEngine {
    config: EngineConfig,
    aggregator: PriceAggregator,
    scan_params: ScanParams,
    executor: TradeExecutor,
    next_cycle_id: u64,
}

impl CycleEngine {
    pub fn new(exchanges: Vec<Arc<dyn ExchangeClient>>, config: EngineConfig) -> Self {
        let executor = TradeExecutor::from_config(&exchanges, &config);
        let scan_params = ScanParams::from(&config);
        Self {
            aggregator: PriceAggregator::new(exchanges),
            scan_params,
            executor,
            config,
            next_cycle_id: 1,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch failure counters per exchange.
    pub fn failure_counters(&self) -> &FailureCounters {
        self.aggregator.counters()
    }

    /// Runs one fetch, scan and execute pass. Always returns a result; fatal
    /// conditions are reported through its status.
    pub async fn run_cycle(&mut self) -> CycleResult {
        let cycle_id = self.next_cycle_id;
        self.next_cycle_id += 1;

        let started = Instant::now();
        let deadline = started + self.config.cycle_deadline;
        let mut result = CycleResult::new(cycle_id, Utc::now());

        debug!(cycle_id, "cycle started");

        let set = match self
            .aggregator
            .fetch_all(cycle_id, &self.config.symbols, self.config.fetch_timeout)
            .await
        {
            Ok(set) => set,
            Err(err) => {
                if let EngineError::AggregationFailed { failures, .. } = &err {
                    result.errors.extend(failures.iter().map(ErrorRecord::from));
                }
                result.errors.push(ErrorRecord::from(&err));
                result.status = CycleStatus::AggregationFailed;
                error!(cycle_id, error = %err, "aggregation failed");
                return finish(result, started);
            }
        };

        debug!(
            cycle_id = set.cycle_id,
            taken_at = %set.taken_at,
            snapshots = set.snapshots.len(),
            "snapshots ready"
        );
        result.snapshots_taken = set.snapshots.len();
        result.quotes_received = set.quotes_received();
        result.errors.extend(set.failures.iter().map(ErrorRecord::from));

        let opportunities = scan_all(&set, &self.scan_params);
        result.opportunities_found = opportunities.len();

        if !self.config.execute_trades {
            return finish(result, started);
        }

        let mut executed = HashSet::new();
        for opportunity in opportunities {
            if result.trades_attempted >= self.config.max_trades_per_cycle {
                break;
            }
            if Instant::now() >= deadline {
                info!(cycle_id, "cycle deadline reached, skipping remaining opportunities");
                result.deadline_reached = true;
                break;
            }
            if !executed.insert(opportunity.id.clone()) {
                continue;
            }

            match self.executor.execute(opportunity).await {
                Ok(attempt) => {
                    result.trades_attempted += 1;
                    if attempt.is_settled() {
                        result.trades_settled += 1;
                    }
                    result.trades.push(attempt);
                }
                Err(err) => {
                    error!(cycle_id, error = %err, "executor rejected opportunity");
                    result.errors.push(ErrorRecord::from(&err));
                    result.status = CycleStatus::ExecutorDefect;
                    break;
                }
            }
        }

        finish(result, started)
    }
}

fn finish(mut result: CycleResult, started: Instant) -> CycleResult {
    result.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    info!(
        cycle_id = result.cycle_id,
        status = ?result.status,
        elapsed_ms = result.elapsed_ms,
        quotes = result.quotes_received,
        opportunities = result.opportunities_found,
        trades = result.trades_attempted,
        settled = result.trades_settled,
        errors = result.errors.len(),
        "cycle finished"
    );
    result
}
