//! SQLite implementation of TradeJournal.

use crate::domain::{TradeAttempt, TradeOutcome};
use crate::storage::{JournalEntry, StorageError, TradeJournal};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};

const SELECT_ENTRY: &str = r#"
    SELECT id, cycle_id, opportunity_id, symbol, buy_exchange, sell_exchange,
        buy_price, sell_price, expected_spread_bps, target_quantity, bought_quantity,
        sold_quantity, residual_quantity, outcome, attempts, started_at, finished_at
    FROM trade_attempts
"#;

/// SqliteJournal implements TradeJournal using SQLite.
pub struct SqliteJournal {
    pool: Pool<Sqlite>,
}

/// SqliteJournalConfig holds SQLite journal configuration.
#[derive(Debug, Clone)]
pub struct SqliteJournalConfig {
    /// Path to the SQLite database file.
    pub path: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
}

impl Default for SqliteJournalConfig {
    fn default() -> Self {
        Self {
            path: "trades.db".to_string(),
            max_connections: 5,
        }
    }
}

impl SqliteJournal {
    /// Opens (or creates) the journal database.
    pub async fn new(config: SqliteJournalConfig) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let journal = Self { pool };

        journal.migrate().await?;

        info!(path = %config.path, "trade journal initialized");
        Ok(journal)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_attempts (
                id TEXT PRIMARY KEY,
                cycle_id INTEGER NOT NULL,
                opportunity_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                buy_exchange TEXT NOT NULL,
                sell_exchange TEXT NOT NULL,
                buy_price TEXT NOT NULL,
                sell_price TEXT NOT NULL,
                expected_spread_bps TEXT NOT NULL,
                target_quantity TEXT NOT NULL,
                bought_quantity TEXT NOT NULL,
                sold_quantity TEXT NOT NULL,
                residual_quantity TEXT NOT NULL,
                has_residual INTEGER NOT NULL,
                outcome TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                legs TEXT NOT NULL,
                errors TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_trade_attempts_residual ON trade_attempts(has_residual, finished_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trade_attempts_cycle ON trade_attempts(cycle_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl TradeJournal for SqliteJournal {
    async fn record(&self, cycle_id: u64, attempt: &TradeAttempt) -> Result<bool, StorageError> {
        let finished_at = match attempt.finished_at {
            Some(at) if attempt.outcome.is_terminal() => at,
            _ => return Err(StorageError::NotTerminal(attempt.id.clone())),
        };
        let cycle_id = i64::try_from(cycle_id)
            .map_err(|_| StorageError::InvalidData(format!("cycle id {} out of range", cycle_id)))?;
        let opp = &attempt.opportunity;

        let result = sqlx::query(
            r#"
            INSERT INTO trade_attempts (
                id, cycle_id, opportunity_id, symbol, buy_exchange, sell_exchange,
                buy_price, sell_price, expected_spread_bps, target_quantity,
                bought_quantity, sold_quantity, residual_quantity, has_residual,
                outcome, attempts, legs, errors, started_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&attempt.id)
        .bind(cycle_id)
        .bind(&opp.id)
        .bind(&opp.symbol)
        .bind(&opp.buy_exchange)
        .bind(&opp.sell_exchange)
        .bind(opp.buy_price.to_string())
        .bind(opp.sell_price.to_string())
        .bind(opp.expected_spread_bps.to_string())
        .bind(attempt.target_quantity.to_string())
        .bind(attempt.bought_quantity.to_string())
        .bind(attempt.sold_quantity.to_string())
        .bind(attempt.residual_quantity.to_string())
        .bind(attempt.has_residual())
        .bind(attempt.outcome.to_string())
        .bind(i64::from(attempt.attempt_no()))
        .bind(serde_json::to_string(&attempt.legs)?)
        .bind(serde_json::to_string(&attempt.errors)?)
        .bind(attempt.started_at.to_rfc3339())
        .bind(finished_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            debug!(
                id = %attempt.id,
                symbol = %opp.symbol,
                outcome = %attempt.outcome,
                "trade attempt journaled"
            );
        }

        Ok(inserted)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<JournalEntry>, StorageError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ENTRY))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(parse_entry_row).transpose()
    }

    async fn residuals(&self) -> Result<Vec<JournalEntry>, StorageError> {
        let rows = sqlx::query(&format!(
            "{} WHERE has_residual = 1 ORDER BY finished_at ASC",
            SELECT_ENTRY
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_entry_row).collect()
    }

    async fn count(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM trade_attempts")
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.try_get("count")?;
        Ok(count)
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, StorageError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw)
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
}

fn time_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StorageError> {
    let raw: String = row.try_get(column)?;
    Ok(DateTime::parse_from_rfc3339(&raw)
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))?
        .with_timezone(&Utc))
}

fn parse_entry_row(row: &SqliteRow) -> Result<JournalEntry, StorageError> {
    let outcome_str: String = row.try_get("outcome")?;
    let outcome = TradeOutcome::from_str(&outcome_str).map_err(StorageError::InvalidData)?;

    let cycle_id: i64 = row.try_get("cycle_id")?;
    let attempts: i64 = row.try_get("attempts")?;

    Ok(JournalEntry {
        id: row.try_get("id")?,
        cycle_id: u64::try_from(cycle_id)
            .map_err(|_| StorageError::InvalidData(format!("Invalid cycle_id: {}", cycle_id)))?,
        opportunity_id: row.try_get("opportunity_id")?,
        symbol: row.try_get("symbol")?,
        buy_exchange: row.try_get("buy_exchange")?,
        sell_exchange: row.try_get("sell_exchange")?,
        buy_price: decimal_column(row, "buy_price")?,
        sell_price: decimal_column(row, "sell_price")?,
        expected_spread_bps: decimal_column(row, "expected_spread_bps")?,
        target_quantity: decimal_column(row, "target_quantity")?,
        bought_quantity: decimal_column(row, "bought_quantity")?,
        sold_quantity: decimal_column(row, "sold_quantity")?,
        residual_quantity: decimal_column(row, "residual_quantity")?,
        outcome,
        attempts: u32::try_from(attempts)
            .map_err(|_| StorageError::InvalidData(format!("Invalid attempts: {}", attempts)))?,
        started_at: time_column(row, "started_at")?,
        finished_at: time_column(row, "finished_at")?,
    })
}
