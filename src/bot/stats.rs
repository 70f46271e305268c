//! Runtime statistics for the bot.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{CycleResult, CycleStatus, TradeOutcome};

/// Counters accumulated over all cycles of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub cycles: u64,
    pub aggregation_failures: u64,
    pub executor_defects: u64,
    pub deadline_hits: u64,
    pub opportunities_found: u64,
    pub trades_attempted: u64,
    pub trades_settled: u64,
    pub trades_failed: u64,
    pub trades_aborted: u64,
    /// Attempts that left bought but unsold quantity.
    pub residual_trades: u64,
    /// Quote-currency profit implied by the expected spread of settled trades.
    pub expected_profit: Decimal,
    pub best_spread_bps: Option<Decimal>,
}

impl Stats {
    /// Folds one cycle into the counters.
    pub fn record(&mut self, result: &CycleResult) {
        self.cycles += 1;
        match result.status {
            CycleStatus::Completed => {}
            CycleStatus::AggregationFailed => self.aggregation_failures += 1,
            CycleStatus::ExecutorDefect => self.executor_defects += 1,
        }
        if result.deadline_reached {
            self.deadline_hits += 1;
        }
        self.opportunities_found += result.opportunities_found as u64;

        for trade in &result.trades {
            self.trades_attempted += 1;
            match trade.outcome {
                TradeOutcome::Filled | TradeOutcome::PartiallyFilled => {
                    self.trades_settled += 1;
                    self.expected_profit += trade.sold_quantity * trade.opportunity.buy_price
                        * trade.opportunity.expected_spread_bps
                        / crate::domain::BPS_PER_UNIT;
                }
                TradeOutcome::Failed => self.trades_failed += 1,
                TradeOutcome::Aborted => self.trades_aborted += 1,
                TradeOutcome::Pending => {}
            }
            if trade.has_residual() {
                self.residual_trades += 1;
            }

            let spread = trade.opportunity.expected_spread_bps;
            if self.best_spread_bps.is_none_or(|best| spread > best) {
                self.best_spread_bps = Some(spread);
            }
        }
    }
}
