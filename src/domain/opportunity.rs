//! Arbitrage opportunity domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::BPS_PER_UNIT;

/// Opportunity is a fee and slippage adjusted price differential between two
/// exchanges for one symbol at one snapshot instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Deterministic identifier derived from symbol, legs and snapshot instant.
    pub id: String,
    /// Trading pair (e.g., "BTC/USDT").
    pub symbol: String,
    /// Exchange where to buy.
    pub buy_exchange: String,
    /// Exchange where to sell.
    pub sell_exchange: String,
    /// Ask price on the buy exchange.
    pub buy_price: Decimal,
    /// Bid price on the sell exchange.
    pub sell_price: Decimal,
    /// Raw spread before fees and slippage, in bps of the buy price.
    pub gross_spread_bps: Decimal,
    /// Spread net of both fees and the slippage margin, in bps.
    pub expected_spread_bps: Decimal,
    /// Maximum base quantity to trade.
    pub max_quantity: Decimal,
    /// Snapshot instant the opportunity was detected in.
    pub detected_at: DateTime<Utc>,
}

impl Opportunity {
    /// Builds the identifier used for an opportunity.
    pub fn make_id(
        symbol: &str,
        buy_exchange: &str,
        sell_exchange: &str,
        detected_at: DateTime<Utc>,
    ) -> String {
        format!(
            "{}:{}->{}@{}",
            symbol,
            buy_exchange,
            sell_exchange,
            detected_at.timestamp_millis()
        )
    }

    /// Checks the structural invariants an executor relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.buy_exchange == self.sell_exchange {
            return Err(format!(
                "opportunity {} buys and sells on the same exchange {}",
                self.id, self.buy_exchange
            ));
        }
        if self.buy_price <= Decimal::ZERO || self.sell_price <= Decimal::ZERO {
            return Err(format!("opportunity {} has a non-positive price", self.id));
        }
        if self.max_quantity <= Decimal::ZERO {
            return Err(format!("opportunity {} has a non-positive quantity", self.id));
        }
        Ok(())
    }

    /// Quote-currency value of the buy leg at full size.
    pub fn notional(&self) -> Decimal {
        self.buy_price * self.max_quantity
    }

    /// Expected net profit in quote currency at full size.
    pub fn expected_profit(&self) -> Decimal {
        self.notional() * self.expected_spread_bps / BPS_PER_UNIT
    }
}
