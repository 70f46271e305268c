//! Exchange integration abstractions and implementations.

mod manager;
#[cfg(test)]
pub(crate) mod mock;
mod paper;
pub mod poloniex;
mod utils;

use crate::domain::{OrderRef, OrderReport, OrderRequest, PriceQuote};
use async_trait::async_trait;
use thiserror::Error;

pub use manager::Manager;
pub use paper::PaperExchange;

/// Exchange errors.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Trading pair is not supported by this exchange.
    #[error("pair {0} is not supported")]
    PairNotSupported(String),

    /// Insufficient funds for the operation.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Order not found.
    #[error("order {0} not found")]
    OrderNotFound(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The exchange did not answer in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// API error from the exchange.
    #[error("API error: {0}")]
    Api(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ExchangeError {
    /// Returns true if a failed request may still have been applied by the
    /// exchange, so its effect has to be checked with a status query.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, ExchangeError::Connection(_) | ExchangeError::Timeout(_))
    }
}

/// Result type for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// ExchangeClient is the capability set the engine needs from one exchange.
///
/// Every call must be safe to repeat: an order placed with a client order id
/// can always be looked up again with `OrderRef::Client`.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Unique identifier of this exchange (e.g., "poloniex").
    fn name(&self) -> &str;

    /// Connect checks connectivity and prepares the client.
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    /// Disconnect releases client resources. Safe to call multiple times.
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    /// Returns true if the client considers itself healthy.
    fn is_connected(&self) -> bool {
        true
    }

    /// Fetches the best bid/ask for a "BASE/QUOTE" symbol.
    /// Returns None if the exchange has no book for it right now.
    async fn get_quote(&self, symbol: &str) -> Result<Option<PriceQuote>>;

    /// Submits a limit order and returns the exchange order id.
    async fn place_order(&self, request: &OrderRequest) -> Result<String>;

    /// Queries the status of an order by exchange or client id.
    async fn get_order_status(&self, symbol: &str, order: &OrderRef) -> Result<OrderReport>;

    /// Cancels an order. Returns false if it was no longer cancellable
    /// (already filled or already cancelled).
    async fn cancel_order(&self, symbol: &str, order: &OrderRef) -> Result<bool>;
}
