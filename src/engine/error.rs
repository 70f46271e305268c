//! Engine error types.

use thiserror::Error;

use crate::domain::{ErrorKind, ErrorRecord};

/// Errors produced by the fetch, scan and execute stages.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("{exchange} did not return a {symbol} quote in time")]
    FetchTimeout { exchange: String, symbol: String },

    #[error("{exchange} failed to return a {symbol} quote: {message}")]
    FetchError {
        exchange: String,
        symbol: String,
        message: String,
    },

    #[error("no quotes received from {fetches} fetches")]
    AggregationFailed {
        fetches: usize,
        failures: Vec<EngineError>,
    },

    #[error("order on {exchange} for {symbol} failed: {message}")]
    OrderPlacement {
        exchange: String,
        symbol: String,
        message: String,
    },

    #[error("order status on {exchange} for {symbol} unknown: {message}")]
    OrderStatusUnknown {
        exchange: String,
        symbol: String,
        message: String,
    },

    #[error("{exchange} {symbol} leg gave up after {attempts} attempts")]
    RetriesExhausted {
        exchange: String,
        symbol: String,
        attempts: u32,
    },

    #[error("invalid opportunity: {0}")]
    InvalidOpportunity(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::FetchTimeout { .. } => ErrorKind::FetchTimeout,
            EngineError::FetchError { .. } => ErrorKind::FetchError,
            EngineError::AggregationFailed { .. } => ErrorKind::AggregationFailed,
            EngineError::OrderPlacement { .. } => ErrorKind::OrderPlacement,
            EngineError::OrderStatusUnknown { .. } => ErrorKind::OrderStatusUnknown,
            EngineError::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            EngineError::InvalidOpportunity(_) => ErrorKind::InvalidOpportunity,
        }
    }

    /// Returns true for errors that end the whole cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::AggregationFailed { .. } | EngineError::InvalidOpportunity(_)
        )
    }

    fn location(&self) -> (Option<&str>, Option<&str>) {
        match self {
            EngineError::FetchTimeout { exchange, symbol }
            | EngineError::FetchError {
                exchange, symbol, ..
            }
            | EngineError::OrderPlacement {
                exchange, symbol, ..
            }
            | EngineError::OrderStatusUnknown {
                exchange, symbol, ..
            }
            | EngineError::RetriesExhausted {
                exchange, symbol, ..
            } => (Some(exchange), Some(symbol)),
            EngineError::AggregationFailed { .. } | EngineError::InvalidOpportunity(_) => {
                (None, None)
            }
        }
    }
}

impl From<&EngineError> for ErrorRecord {
    fn from(err: &EngineError) -> Self {
        let (exchange, symbol) = err.location();
        ErrorRecord {
            kind: err.kind(),
            exchange: exchange.map(str::to_string),
            symbol: symbol.map(str::to_string),
            message: err.to_string(),
        }
    }
}
