//! Best bid/ask quote as reported by a single exchange.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a quote is rejected before it reaches a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    #[error("non-positive price: bid {bid}, ask {ask}")]
    NonPositivePrice { bid: Decimal, ask: Decimal },
    #[error("crossed quote: bid {bid} > ask {ask}")]
    Crossed { bid: Decimal, ask: Decimal },
    #[error("quote for {actual} returned when {expected} was requested")]
    SymbolMismatch { expected: String, actual: String },
    #[error("negative displayed depth")]
    NegativeDepth,
}

/// PriceQuote is the top of the book for one symbol on one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Exchange that produced the quote.
    pub exchange: String,
    /// Trading pair in "BASE/QUOTE" format.
    pub symbol: String,
    /// Best bid price.
    pub bid: Decimal,
    /// Best ask price.
    pub ask: Decimal,
    /// Displayed quantity at the best bid, when reported.
    pub bid_size: Option<Decimal>,
    /// Displayed quantity at the best ask, when reported.
    pub ask_size: Option<Decimal>,
    /// Exchange-side timestamp of the quote.
    pub timestamp: DateTime<Utc>,
    /// Per-client sequence number.
    pub sequence_no: u64,
}

impl PriceQuote {
    pub fn new(
        exchange: impl Into<String>,
        symbol: impl Into<String>,
        bid: Decimal,
        ask: Decimal,
        timestamp: DateTime<Utc>,
        sequence_no: u64,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            bid,
            ask,
            bid_size: None,
            ask_size: None,
            timestamp,
            sequence_no,
        }
    }

    /// Attaches displayed depth at the best levels.
    pub fn with_depth(mut self, bid_size: Decimal, ask_size: Decimal) -> Self {
        self.bid_size = Some(bid_size);
        self.ask_size = Some(ask_size);
        self
    }

    /// Checks the quote invariants: both prices positive and bid <= ask.
    pub fn validate(&self) -> Result<(), QuoteError> {
        if self.bid <= Decimal::ZERO || self.ask <= Decimal::ZERO {
            return Err(QuoteError::NonPositivePrice {
                bid: self.bid,
                ask: self.ask,
            });
        }
        if self.bid > self.ask {
            return Err(QuoteError::Crossed {
                bid: self.bid,
                ask: self.ask,
            });
        }
        let negative = |size: Option<Decimal>| size.is_some_and(|s| s.is_sign_negative() && !s.is_zero());
        if negative(self.bid_size) || negative(self.ask_size) {
            return Err(QuoteError::NegativeDepth);
        }
        Ok(())
    }

    /// Validates the quote and checks it answers a request for `symbol`.
    pub fn validate_for(&self, symbol: &str) -> Result<(), QuoteError> {
        if self.symbol != symbol {
            return Err(QuoteError::SymbolMismatch {
                expected: symbol.to_string(),
                actual: self.symbol.clone(),
            });
        }
        self.validate()
    }
}
