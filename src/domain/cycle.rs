//! Cycle-level result and structured error records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::TradeAttempt;

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// Ran to the end; individual fetch or trade failures may still be recorded.
    Completed,
    /// No exchange produced a quote.
    AggregationFailed,
    /// The executor reported an internal invariant violation.
    ExecutorDefect,
}

impl CycleStatus {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CycleStatus::Completed)
    }
}

/// Error categories reported by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FetchTimeout,
    FetchError,
    AggregationFailed,
    OrderPlacement,
    OrderStatusUnknown,
    RetriesExhausted,
    InvalidOpportunity,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::FetchTimeout => "fetch_timeout",
            ErrorKind::FetchError => "fetch_error",
            ErrorKind::AggregationFailed => "aggregation_failed",
            ErrorKind::OrderPlacement => "order_placement",
            ErrorKind::OrderStatusUnknown => "order_status_unknown",
            ErrorKind::RetriesExhausted => "retries_exhausted",
            ErrorKind::InvalidOpportunity => "invalid_opportunity",
        };
        write!(f, "{}", s)
    }
}

/// Structured error entry; the core never formats log lines for these.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub message: String,
}

/// CycleResult summarizes one fetch, scan and execute pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleResult {
    pub cycle_id: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub status: CycleStatus,
    /// Number of per-symbol snapshots produced.
    pub snapshots_taken: usize,
    /// Number of valid quotes across all snapshots.
    pub quotes_received: usize,
    pub opportunities_found: usize,
    pub trades_attempted: usize,
    pub trades_settled: usize,
    /// True if the cycle deadline stopped further executions.
    pub deadline_reached: bool,
    pub trades: Vec<TradeAttempt>,
    pub errors: Vec<ErrorRecord>,
}

impl CycleResult {
    /// Creates an empty result for a cycle that just started.
    pub fn new(cycle_id: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            started_at,
            elapsed_ms: 0,
            status: CycleStatus::Completed,
            snapshots_taken: 0,
            quotes_received: 0,
            opportunities_found: 0,
            trades_attempted: 0,
            trades_settled: 0,
            deadline_reached: false,
            trades: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.status.is_fatal()
    }

    /// Trades that ended with an unsold position.
    pub fn residual_trades(&self) -> impl Iterator<Item = &TradeAttempt> {
        self.trades.iter().filter(|t| t.has_residual())
    }
}
