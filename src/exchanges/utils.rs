//! Common utilities for exchange implementations.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::domain::OrderStatus;

/// Converts "BTC/USDT" to "BTC_USDT".
pub fn pair_to_symbol(pair: &str) -> String {
    pair.replace('/', "_")
}

/// Maps common order states to OrderStatus.
///
/// A cancelled order that had partial fills is still reported as cancelled;
/// the caller reads the filled quantity separately.
pub fn parse_order_status(state: &str) -> OrderStatus {
    match state.to_uppercase().as_str() {
        "NEW" | "PENDING_NEW" => OrderStatus::Open,
        "PARTIALLY_FILLED" => OrderStatus::Partial,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "CANCELLED" | "PARTIALLY_CANCELED" | "FAILED" | "EXPIRED" | "REJECTED" => {
            OrderStatus::Cancelled
        }
        _ => OrderStatus::Unknown,
    }
}

/// Parses a decimal field, falling back to zero for empty or malformed values.
pub fn parse_decimal_or_zero(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap_or_default()
}

/// Returns the first (price, quantity) level of a flat [price, qty, price, qty, ...] array.
pub fn parse_best_level(data: &[String]) -> Option<(Decimal, Decimal)> {
    match data {
        [price, quantity, ..] => {
            let price = Decimal::from_str(price).ok()?;
            let quantity = Decimal::from_str(quantity).ok()?;
            Some((price, quantity))
        }
        _ => None,
    }
}
