//! Trade attempt produced by the executor for one opportunity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::{ErrorRecord, Opportunity, OrderSide, OrderStatus};

/// Terminal (or pending) outcome of a trade attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeOutcome {
    /// Still executing.
    Pending,
    /// Full target bought and all of it sold.
    Filled,
    /// Buy filled partially and the filled part was sold.
    PartiallyFilled,
    /// Something bought could not be sold; see residual quantity.
    Failed,
    /// Nothing was bought; the attempt was abandoned before any fill.
    Aborted,
}

impl TradeOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeOutcome::Pending)
    }

    /// Returns true if both legs completed with no residual position.
    pub fn is_settled(&self) -> bool {
        matches!(self, TradeOutcome::Filled | TradeOutcome::PartiallyFilled)
    }
}

impl fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeOutcome::Pending => "PENDING",
            TradeOutcome::Filled => "FILLED",
            TradeOutcome::PartiallyFilled => "PARTIALLY_FILLED",
            TradeOutcome::Failed => "FAILED",
            TradeOutcome::Aborted => "ABORTED",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for TradeOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TradeOutcome::Pending),
            "FILLED" => Ok(TradeOutcome::Filled),
            "PARTIALLY_FILLED" => Ok(TradeOutcome::PartiallyFilled),
            "FAILED" => Ok(TradeOutcome::Failed),
            "ABORTED" => Ok(TradeOutcome::Aborted),
            _ => Err(format!("unknown trade outcome: {}", s)),
        }
    }
}

/// Executor state machine phases, recorded in order of entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    PlacingBuy,
    AwaitingBuyFill,
    PlacingSell,
    AwaitingSellFill,
    Settled,
    Failed,
    Aborted,
}

/// One order placed for one leg attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegRecord {
    pub exchange: String,
    pub side: OrderSide,
    pub client_order_id: String,
    /// Exchange order id, if placement returned one.
    pub order_id: Option<String>,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    /// Last status observed for the order.
    pub status: OrderStatus,
}

/// TradeAttempt is the executor's record of one opportunity execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeAttempt {
    pub id: String,
    pub opportunity: Opportunity,
    /// Every order placed, in order.
    pub legs: Vec<LegRecord>,
    pub buy_attempts: u32,
    pub sell_attempts: u32,
    /// Quantity the buy leg aimed for.
    pub target_quantity: Decimal,
    pub bought_quantity: Decimal,
    pub sold_quantity: Decimal,
    /// Bought but unsold quantity the caller has to reconcile.
    pub residual_quantity: Decimal,
    pub outcome: TradeOutcome,
    pub trace: Vec<ExecutionPhase>,
    pub errors: Vec<ErrorRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TradeAttempt {
    /// Starts a pending attempt for an opportunity.
    pub fn new(id: impl Into<String>, opportunity: Opportunity) -> Self {
        let target_quantity = opportunity.max_quantity;
        Self {
            id: id.into(),
            opportunity,
            legs: Vec::new(),
            buy_attempts: 0,
            sell_attempts: 0,
            target_quantity,
            bought_quantity: Decimal::ZERO,
            sold_quantity: Decimal::ZERO,
            residual_quantity: Decimal::ZERO,
            outcome: TradeOutcome::Pending,
            trace: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Total number of leg attempts made.
    pub fn attempt_no(&self) -> u32 {
        self.buy_attempts + self.sell_attempts
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_settled()
    }

    pub fn has_residual(&self) -> bool {
        self.residual_quantity > Decimal::ZERO
    }

    /// Closes the attempt with a terminal outcome.
    pub fn finish(&mut self, outcome: TradeOutcome) {
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
    }
}
