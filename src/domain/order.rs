//! Order requests and status reports exchanged with exchange clients.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// OrderSide represents the direction of an order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// OrderStatus is the exchange-reported state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted and resting, nothing filled yet.
    Open,
    /// Completely filled.
    Filled,
    /// Partially filled and still working.
    Partial,
    /// Cancelled or expired; may carry a partial fill.
    Cancelled,
    /// The exchange could not tell (or the order is not visible yet).
    Unknown,
}

impl OrderStatus {
    /// Returns true if the order can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

/// Limit order submitted by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client-generated id; lets the executor look the order up after an
    /// ambiguous send.
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Reference used to query or cancel an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "id", rename_all = "snake_case")]
pub enum OrderRef {
    /// Id assigned by the exchange.
    Exchange(String),
    /// Id assigned by us at placement.
    Client(String),
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderRef::Exchange(id) => write!(f, "{}", id),
            OrderRef::Client(id) => write!(f, "cid:{}", id),
        }
    }
}

/// Status query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReport {
    pub status: OrderStatus,
    /// Base quantity filled so far.
    pub filled_quantity: Decimal,
    /// Average fill price, when reported.
    pub average_price: Option<Decimal>,
}

impl OrderReport {
    pub fn new(status: OrderStatus, filled_quantity: Decimal) -> Self {
        Self {
            status,
            filled_quantity,
            average_price: None,
        }
    }
}
