//! Trade journal: durable record of every terminal trade attempt.

mod sqlite;

pub use sqlite::{SqliteJournal, SqliteJournalConfig};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{TradeAttempt, TradeOutcome};
use async_trait::async_trait;

/// TradeJournal persists finished trade attempts for later reconciliation.
#[async_trait]
pub trait TradeJournal: Send + Sync {
    /// Records a terminal attempt.
    /// Returns true if it was stored, false if the attempt id is already known.
    async fn record(&self, cycle_id: u64, attempt: &TradeAttempt) -> Result<bool, StorageError>;

    /// Looks a journaled attempt up by its id.
    async fn get_by_id(&self, id: &str) -> Result<Option<JournalEntry>, StorageError>;

    /// Attempts that left bought but unsold quantity, oldest first.
    async fn residuals(&self) -> Result<Vec<JournalEntry>, StorageError>;

    /// Count returns the total number of journaled attempts.
    async fn count(&self) -> Result<i64, StorageError>;

    /// Close closes the storage connection.
    async fn close(&self) -> Result<(), StorageError>;
}

/// Summary row of one journaled attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalEntry {
    pub id: String,
    pub cycle_id: u64,
    pub opportunity_id: String,
    pub symbol: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub expected_spread_bps: Decimal,
    pub target_quantity: Decimal,
    pub bought_quantity: Decimal,
    pub sold_quantity: Decimal,
    pub residual_quantity: Decimal,
    pub outcome: TradeOutcome,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// StorageError represents errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Attempt {0} is not finished")]
    NotTerminal(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
