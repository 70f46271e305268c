//! Trading fee structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Taker fee rates per exchange, expressed in basis points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeTable {
    rates: HashMap<String, Decimal>,
}

impl FeeTable {
    /// Creates an empty fee table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fee rate (bps) for an exchange, returning the table for chaining.
    pub fn with(mut self, exchange: impl Into<String>, fee_bps: Decimal) -> Self {
        self.insert(exchange, fee_bps);
        self
    }

    /// Sets the fee rate (bps) for an exchange.
    pub fn insert(&mut self, exchange: impl Into<String>, fee_bps: Decimal) {
        self.rates.insert(exchange.into(), fee_bps);
    }

    /// Returns the fee rate in bps, or None if the exchange has no configured fee.
    pub fn fee_bps(&self, exchange: &str) -> Option<Decimal> {
        self.rates.get(exchange).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}
