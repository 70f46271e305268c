//! Two-leg trade execution with bounded retries.
//!
//! Every order carries a client order id. A send that times out or fails at
//! the transport level may still have reached the exchange, so the executor
//! looks the order up by that id instead of sending it again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EngineConfig, EngineError, RetryPolicy};
use crate::domain::{
    ErrorRecord, ExecutionPhase, LegRecord, Opportunity, OrderRef, OrderReport, OrderRequest,
    OrderSide, OrderStatus, TradeAttempt, TradeOutcome,
};
use crate::exchanges::{ExchangeClient, ExchangeError};

/// How one order ended.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LegResult {
    /// The order reached a final state; `filled` may be zero.
    Done { filled: Decimal },
    /// The exchange refused the order; nothing was placed.
    Rejected,
    /// The final state could not be determined.
    Unresolved { filled: Decimal },
}

/// TradeExecutor turns an opportunity into a buy leg followed by a sell leg.
pub struct TradeExecutor {
    exchanges: HashMap<String, Arc<dyn ExchangeClient>>,
    retry: RetryPolicy,
    leg_timeout: Duration,
    poll_interval: Duration,
}

impl TradeExecutor {
    pub fn new(
        exchanges: &[Arc<dyn ExchangeClient>],
        retry: RetryPolicy,
        leg_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        debug!(
            max_retries = retry.max_retries(),
            backoff = ?retry.backoff(),
            leg_timeout = ?leg_timeout,
            poll_interval = ?poll_interval,
            "trade executor configured"
        );
        Self {
            exchanges: exchanges
                .iter()
                .map(|e| (e.name().to_string(), Arc::clone(e)))
                .collect(),
            retry,
            leg_timeout,
            poll_interval,
        }
    }

    pub fn from_config(exchanges: &[Arc<dyn ExchangeClient>], config: &EngineConfig) -> Self {
        Self::new(
            exchanges,
            config.retry.clone(),
            config.leg_timeout,
            config.fill_poll_interval,
        )
    }

    /// Executes an opportunity to a terminal outcome.
    ///
    /// Returns an error only for opportunities that should never have been
    /// produced; trade failures are reported in the returned attempt.
    pub async fn execute(&self, opportunity: Opportunity) -> Result<TradeAttempt, EngineError> {
        opportunity
            .validate()
            .map_err(EngineError::InvalidOpportunity)?;
        let buy_client = self.client(&opportunity.buy_exchange, &opportunity.id)?;
        let sell_client = self.client(&opportunity.sell_exchange, &opportunity.id)?;

        let mut attempt = TradeAttempt::new(Uuid::new_v4().to_string(), opportunity);

        info!(
            attempt_id = %attempt.id,
            opportunity_id = %attempt.opportunity.id,
            buy_exchange = %attempt.opportunity.buy_exchange,
            sell_exchange = %attempt.opportunity.sell_exchange,
            quantity = %attempt.target_quantity,
            expected_bps = %attempt.opportunity.expected_spread_bps,
            "executing opportunity"
        );

        let (bought, buy_resolved) = self.buy_leg(&buy_client, &mut attempt).await;
        attempt.bought_quantity = bought;

        if bought.is_zero() {
            let outcome = if buy_resolved {
                TradeOutcome::Aborted
            } else {
                TradeOutcome::Failed
            };
            return Ok(self.close(attempt, outcome));
        }

        if !buy_resolved {
            // The confirmed part is sold below; whatever else the buy order
            // filled is not known and must be reconciled by hand.
            let err = EngineError::OrderStatusUnknown {
                exchange: buy_client.name().to_string(),
                symbol: attempt.opportunity.symbol.clone(),
                message: format!(
                    "buy fill unresolved: {} of {} confirmed, remainder unknown",
                    bought, attempt.target_quantity
                ),
            };
            warn!(attempt_id = %attempt.id, "{}", err);
            attempt.errors.push(ErrorRecord::from(&err));
        }

        let (sold, sell_resolved) = self.sell_leg(&sell_client, bought, &mut attempt).await;
        attempt.sold_quantity = sold;
        attempt.residual_quantity = (bought - sold).max(Decimal::ZERO);

        let outcome = if !buy_resolved || !sell_resolved || attempt.has_residual() {
            TradeOutcome::Failed
        } else if bought >= attempt.target_quantity {
            TradeOutcome::Filled
        } else {
            TradeOutcome::PartiallyFilled
        };

        Ok(self.close(attempt, outcome))
    }

    fn client(
        &self,
        exchange: &str,
        opportunity_id: &str,
    ) -> Result<Arc<dyn ExchangeClient>, EngineError> {
        self.exchanges.get(exchange).cloned().ok_or_else(|| {
            EngineError::InvalidOpportunity(format!(
                "opportunity {} references unknown exchange {}",
                opportunity_id, exchange
            ))
        })
    }

    /// Places the buy order, retrying only while nothing has been bought.
    /// Returns the bought quantity and whether it is known for certain.
    async fn buy_leg(
        &self,
        client: &Arc<dyn ExchangeClient>,
        attempt: &mut TradeAttempt,
    ) -> (Decimal, bool) {
        let price = attempt.opportunity.buy_price;
        let quantity = attempt.target_quantity;

        for n in 1..=self.retry.max_attempts() {
            if n > 1 {
                self.retry.wait(n - 1).await;
            }
            attempt.buy_attempts += 1;

            match self
                .run_leg(client, OrderSide::Buy, price, quantity, attempt)
                .await
            {
                LegResult::Done { filled } if filled > Decimal::ZERO => return (filled, true),
                LegResult::Done { .. } | LegResult::Rejected => {
                    debug!(attempt_id = %attempt.id, try_no = n, "buy leg unfilled");
                }
                LegResult::Unresolved { filled } => return (filled, false),
            }
        }

        let err = EngineError::RetriesExhausted {
            exchange: client.name().to_string(),
            symbol: attempt.opportunity.symbol.clone(),
            attempts: attempt.buy_attempts,
        };
        attempt.errors.push(ErrorRecord::from(&err));
        (Decimal::ZERO, true)
    }

    /// Sells `bought`, each retry targeting what is still unsold.
    /// Returns the sold quantity and whether it is known for certain.
    async fn sell_leg(
        &self,
        client: &Arc<dyn ExchangeClient>,
        bought: Decimal,
        attempt: &mut TradeAttempt,
    ) -> (Decimal, bool) {
        let price = attempt.opportunity.sell_price;
        let mut sold = Decimal::ZERO;

        for n in 1..=self.retry.max_attempts() {
            if n > 1 {
                self.retry.wait(n - 1).await;
            }
            attempt.sell_attempts += 1;

            let remaining = bought - sold;
            match self
                .run_leg(client, OrderSide::Sell, price, remaining, attempt)
                .await
            {
                LegResult::Done { filled } => {
                    sold = (sold + filled).min(bought);
                    if sold >= bought {
                        return (sold, true);
                    }
                    debug!(attempt_id = %attempt.id, try_no = n, unsold = %(bought - sold), "sell leg incomplete");
                }
                LegResult::Rejected => {}
                LegResult::Unresolved { filled } => {
                    return ((sold + filled).min(bought), false);
                }
            }
        }

        let err = EngineError::RetriesExhausted {
            exchange: client.name().to_string(),
            symbol: attempt.opportunity.symbol.clone(),
            attempts: attempt.sell_attempts,
        };
        warn!(attempt_id = %attempt.id, unsold = %(bought - sold), "{}", err);
        attempt.errors.push(ErrorRecord::from(&err));
        (sold, true)
    }

    /// Places one order and follows it to a final state.
    async fn run_leg(
        &self,
        client: &Arc<dyn ExchangeClient>,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
        attempt: &mut TradeAttempt,
    ) -> LegResult {
        let (placing, awaiting) = match side {
            OrderSide::Buy => (ExecutionPhase::PlacingBuy, ExecutionPhase::AwaitingBuyFill),
            OrderSide::Sell => (ExecutionPhase::PlacingSell, ExecutionPhase::AwaitingSellFill),
        };
        attempt.trace.push(placing);

        let symbol = attempt.opportunity.symbol.clone();
        let request = OrderRequest {
            client_order_id: Uuid::new_v4().simple().to_string(),
            symbol: symbol.clone(),
            side,
            price,
            quantity,
        };
        let mut record = LegRecord {
            exchange: client.name().to_string(),
            side,
            client_order_id: request.client_order_id.clone(),
            order_id: None,
            price,
            quantity,
            filled_quantity: Decimal::ZERO,
            status: OrderStatus::Unknown,
        };

        let order = match timeout(self.leg_timeout, client.place_order(&request)).await {
            Ok(Ok(order_id)) => {
                record.order_id = Some(order_id.clone());
                OrderRef::Exchange(order_id)
            }
            Ok(Err(e)) if !e.is_ambiguous() => {
                warn!(exchange = %client.name(), side = %side, error = %e, "order rejected");
                let err = EngineError::OrderPlacement {
                    exchange: client.name().to_string(),
                    symbol,
                    message: e.to_string(),
                };
                attempt.errors.push(ErrorRecord::from(&err));
                record.status = OrderStatus::Cancelled;
                attempt.legs.push(record);
                return LegResult::Rejected;
            }
            Ok(Err(e)) => {
                warn!(exchange = %client.name(), side = %side, error = %e, "order send ambiguous, checking status");
                OrderRef::Client(request.client_order_id.clone())
            }
            Err(_) => {
                warn!(exchange = %client.name(), side = %side, "order send timed out, checking status");
                OrderRef::Client(request.client_order_id.clone())
            }
        };

        attempt.trace.push(awaiting);
        let result = self
            .await_fill(client, &symbol, &order, quantity, &mut record, attempt)
            .await;

        debug!(
            exchange = %client.name(),
            side = %side,
            order = %order,
            filled = %record.filled_quantity,
            status = ?record.status,
            "leg finished"
        );
        attempt.legs.push(record);
        result
    }

    /// Polls an order until it is final or the leg times out; a timed-out
    /// order is cancelled and its final status queried again.
    ///
    /// An order looked up by client id may not be indexed yet, so "not found"
    /// only means "never placed" once every query, including the ones after
    /// the cancel, has said so.
    async fn await_fill(
        &self,
        client: &Arc<dyn ExchangeClient>,
        symbol: &str,
        order: &OrderRef,
        quantity: Decimal,
        record: &mut LegRecord,
        attempt: &mut TradeAttempt,
    ) -> LegResult {
        let deadline = Instant::now() + self.leg_timeout;
        let by_client_id = matches!(order, OrderRef::Client(_));
        let mut seen = false;

        loop {
            match self.query(client, symbol, order).await {
                Ok(report) => {
                    seen = true;
                    apply(record, &report);
                    if report.status.is_terminal() || report.filled_quantity >= quantity {
                        return LegResult::Done {
                            filled: report.filled_quantity,
                        };
                    }
                }
                Err(ExchangeError::OrderNotFound(_)) if !by_client_id => {
                    record.status = OrderStatus::Cancelled;
                    return LegResult::Done {
                        filled: Decimal::ZERO,
                    };
                }
                Err(e) => {
                    debug!(exchange = %client.name(), order = %order, error = %e, "status query failed");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }

        info!(exchange = %client.name(), order = %order, "leg timed out, cancelling");
        match timeout(self.leg_timeout, client.cancel_order(symbol, order)).await {
            Ok(Ok(cancelled)) => debug!(order = %order, cancelled, "cancel sent"),
            Ok(Err(e)) => warn!(order = %order, error = %e, "cancel failed"),
            Err(_) => warn!(order = %order, "cancel timed out"),
        }

        let mut last_error = String::from("no status received");
        let mut not_found = 0;
        for n in 1..=self.retry.max_attempts() {
            if n > 1 {
                self.retry.wait(n - 1).await;
            }
            match self.query(client, symbol, order).await {
                Ok(report) => {
                    seen = true;
                    apply(record, &report);
                    if report.status.is_terminal() {
                        return LegResult::Done {
                            filled: report.filled_quantity,
                        };
                    }
                    last_error = format!("order still {:?} after cancel", report.status);
                }
                Err(ExchangeError::OrderNotFound(_)) if !by_client_id => {
                    record.status = OrderStatus::Cancelled;
                    return LegResult::Done {
                        filled: record.filled_quantity,
                    };
                }
                Err(e @ ExchangeError::OrderNotFound(_)) => {
                    not_found += 1;
                    last_error = e.to_string();
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        if by_client_id && !seen && not_found == self.retry.max_attempts() {
            debug!(exchange = %client.name(), order = %order, "order never reached the exchange");
            record.status = OrderStatus::Cancelled;
            return LegResult::Done {
                filled: Decimal::ZERO,
            };
        }

        let err = EngineError::OrderStatusUnknown {
            exchange: client.name().to_string(),
            symbol: symbol.to_string(),
            message: last_error,
        };
        warn!(attempt_id = %attempt.id, order = %order, filled = %record.filled_quantity, "{}", err);
        attempt.errors.push(ErrorRecord::from(&err));
        record.status = OrderStatus::Unknown;
        LegResult::Unresolved {
            filled: record.filled_quantity,
        }
    }

    async fn query(
        &self,
        client: &Arc<dyn ExchangeClient>,
        symbol: &str,
        order: &OrderRef,
    ) -> Result<OrderReport, ExchangeError> {
        match timeout(self.leg_timeout, client.get_order_status(symbol, order)).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout(format!("status of {}", order))),
        }
    }

    fn close(&self, mut attempt: TradeAttempt, outcome: TradeOutcome) -> TradeAttempt {
        attempt.trace.push(match outcome {
            TradeOutcome::Filled | TradeOutcome::PartiallyFilled => ExecutionPhase::Settled,
            TradeOutcome::Aborted => ExecutionPhase::Aborted,
            TradeOutcome::Failed | TradeOutcome::Pending => ExecutionPhase::Failed,
        });
        attempt.finish(outcome);

        info!(
            attempt_id = %attempt.id,
            outcome = %outcome,
            bought = %attempt.bought_quantity,
            sold = %attempt.sold_quantity,
            residual = %attempt.residual_quantity,
            buy_attempts = attempt.buy_attempts,
            sell_attempts = attempt.sell_attempts,
            "trade attempt finished"
        );
        attempt
    }
}

fn apply(record: &mut LegRecord, report: &OrderReport) {
    record.status = report.status;
    record.filled_quantity = report.filled_quantity;
}
