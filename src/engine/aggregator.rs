//! Concurrent quote collection into fixed-capacity per-symbol snapshots.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use super::EngineError;
use crate::domain::{AbsenceReason, PriceQuote, PriceSnapshot, QuoteSlot, SnapshotBuilder};
use crate::exchanges::ExchangeClient;

/// Failure counters for one exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExchangeHealth {
    pub total_failures: u64,
    /// Failures since the last successful fetch.
    pub consecutive_failures: u64,
    pub last_success: Option<DateTime<Utc>>,
}

/// Per-exchange fetch failure counters, exposed for health checks.
#[derive(Debug, Clone, Default)]
pub struct FailureCounters {
    exchanges: BTreeMap<String, ExchangeHealth>,
}

impl FailureCounters {
    fn record_failure(&mut self, exchange: &str) {
        let health = self.exchanges.entry(exchange.to_string()).or_default();
        health.total_failures += 1;
        health.consecutive_failures += 1;
    }

    fn record_success(&mut self, exchange: &str, at: DateTime<Utc>) {
        let health = self.exchanges.entry(exchange.to_string()).or_default();
        health.consecutive_failures = 0;
        health.last_success = Some(at);
    }

    pub fn get(&self, exchange: &str) -> Option<&ExchangeHealth> {
        self.exchanges.get(exchange)
    }

    /// Copy of all counters, ordered by exchange name.
    pub fn snapshot(&self) -> BTreeMap<String, ExchangeHealth> {
        self.exchanges.clone()
    }
}

/// Snapshots produced by one `fetch_all` call, one per symbol.
#[derive(Debug, Clone)]
pub struct SnapshotSet {
    pub cycle_id: u64,
    pub taken_at: DateTime<Utc>,
    pub snapshots: Vec<PriceSnapshot>,
    /// Per-fetch failures; they do not fail the set.
    pub failures: Vec<EngineError>,
}

impl SnapshotSet {
    /// Number of present quotes across all snapshots.
    pub fn quotes_received(&self) -> usize {
        self.snapshots.iter().map(PriceSnapshot::present_count).sum()
    }
}

enum FetchOutcome {
    Quote(PriceQuote),
    NoQuote,
    Timeout,
    Error(String),
}

/// PriceAggregator fetches quotes from every exchange for every symbol.
pub struct PriceAggregator {
    exchanges: Vec<Arc<dyn ExchangeClient>>,
    names: Vec<String>,
    counters: FailureCounters,
    /// Timestamp of the last accepted quote per (exchange, symbol). Kept
    /// across cycles so an exchange can never move a book backwards.
    last_accepted: HashMap<(String, String), DateTime<Utc>>,
}

impl PriceAggregator {
    pub fn new(exchanges: Vec<Arc<dyn ExchangeClient>>) -> Self {
        let names = exchanges.iter().map(|e| e.name().to_string()).collect();
        Self {
            exchanges,
            names,
            counters: FailureCounters::default(),
            last_accepted: HashMap::new(),
        }
    }

    /// Exchange names in slot order.
    pub fn exchanges(&self) -> &[String] {
        &self.names
    }

    pub fn counters(&self) -> &FailureCounters {
        &self.counters
    }

    /// Fetches every (exchange, symbol) pair concurrently, each bounded by
    /// `per_fetch_timeout`. Individual failures become absent slots; the call
    /// fails only if no quote at all was received.
    pub async fn fetch_all(
        &mut self,
        cycle_id: u64,
        symbols: &[String],
        per_fetch_timeout: Duration,
    ) -> Result<SnapshotSet, EngineError> {
        let taken_at = Utc::now();
        let mut builders: Vec<SnapshotBuilder> = symbols
            .iter()
            .map(|symbol| SnapshotBuilder::new(symbol.clone(), &self.names, taken_at))
            .collect();

        let fetches = self.exchanges.iter().enumerate().flat_map(|(ex_idx, exchange)| {
            symbols.iter().enumerate().map(move |(sym_idx, symbol)| {
                let exchange = Arc::clone(exchange);
                async move {
                    let outcome =
                        match tokio::time::timeout(per_fetch_timeout, exchange.get_quote(symbol))
                            .await
                        {
                            Ok(Ok(Some(quote))) => FetchOutcome::Quote(quote),
                            Ok(Ok(None)) => FetchOutcome::NoQuote,
                            Ok(Err(e)) => FetchOutcome::Error(e.to_string()),
                            Err(_) => FetchOutcome::Timeout,
                        };
                    (ex_idx, sym_idx, outcome)
                }
            })
        });

        let outcomes = join_all(fetches).await;
        let fetch_count = outcomes.len();
        let mut failures = Vec::new();

        for (ex_idx, sym_idx, outcome) in outcomes {
            let exchange = self.names[ex_idx].clone();
            let symbol = &symbols[sym_idx];
            let slot = self.accept(&exchange, symbol, outcome, taken_at, &mut failures);
            builders[sym_idx].fill(ex_idx, slot);
        }

        let snapshots: Vec<PriceSnapshot> =
            builders.into_iter().map(SnapshotBuilder::freeze).collect();
        let set = SnapshotSet {
            cycle_id,
            taken_at,
            snapshots,
            failures,
        };

        for snapshot in &set.snapshots {
            debug!(
                cycle_id,
                symbol = %snapshot.symbol(),
                present = snapshot.present_count(),
                capacity = snapshot.capacity(),
                "snapshot frozen"
            );
        }

        debug!(
            cycle_id,
            fetches = fetch_count,
            quotes = set.quotes_received(),
            failures = set.failures.len(),
            "quotes collected"
        );

        if set.quotes_received() == 0 {
            warn!(cycle_id, fetches = fetch_count, "no quotes received");
            return Err(EngineError::AggregationFailed {
                fetches: fetch_count,
                failures: set.failures,
            });
        }

        Ok(set)
    }

    /// Turns one fetch outcome into a slot and updates counters.
    fn accept(
        &mut self,
        exchange: &str,
        symbol: &str,
        outcome: FetchOutcome,
        now: DateTime<Utc>,
        failures: &mut Vec<EngineError>,
    ) -> QuoteSlot {
        match outcome {
            FetchOutcome::Quote(quote) => {
                if let Err(e) = quote.validate_for(symbol) {
                    warn!(exchange = %exchange, symbol = %symbol, error = %e, "invalid quote rejected");
                    self.counters.record_failure(exchange);
                    failures.push(EngineError::FetchError {
                        exchange: exchange.to_string(),
                        symbol: symbol.to_string(),
                        message: e.to_string(),
                    });
                    return QuoteSlot::Absent(AbsenceReason::Invalid);
                }

                let key = (exchange.to_string(), symbol.to_string());
                if let Some(last) = self.last_accepted.get(&key) {
                    if quote.timestamp < *last {
                        debug!(
                            exchange = %exchange,
                            symbol = %symbol,
                            quote_time = %quote.timestamp,
                            last_time = %last,
                            "stale quote dropped"
                        );
                        return QuoteSlot::Absent(AbsenceReason::Stale);
                    }
                }

                self.last_accepted.insert(key, quote.timestamp);
                self.counters.record_success(exchange, now);
                QuoteSlot::Present(quote)
            }
            FetchOutcome::NoQuote => {
                self.counters.record_success(exchange, now);
                QuoteSlot::Absent(AbsenceReason::NoQuote)
            }
            FetchOutcome::Timeout => {
                warn!(exchange = %exchange, symbol = %symbol, "quote fetch timed out");
                self.counters.record_failure(exchange);
                failures.push(EngineError::FetchTimeout {
                    exchange: exchange.to_string(),
                    symbol: symbol.to_string(),
                });
                QuoteSlot::Absent(AbsenceReason::Timeout)
            }
            FetchOutcome::Error(message) => {
                warn!(exchange = %exchange, symbol = %symbol, error = %message, "quote fetch failed");
                self.counters.record_failure(exchange);
                failures.push(EngineError::FetchError {
                    exchange: exchange.to_string(),
                    symbol: symbol.to_string(),
                    message,
                });
                QuoteSlot::Absent(AbsenceReason::Error)
            }
        }
    }
}
