//! Paper trading wrapper: real quotes, simulated orders.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{ExchangeClient, ExchangeError, Result};
use crate::domain::{OrderRef, OrderReport, OrderRequest, OrderSide, OrderStatus, PriceQuote};

#[derive(Debug, Clone)]
struct PaperOrder {
    exchange_id: String,
    quantity: Decimal,
    report: OrderReport,
}

#[derive(Default)]
struct Book {
    quotes: HashMap<String, PriceQuote>,
    /// Orders keyed by client order id.
    orders: HashMap<String, PaperOrder>,
}

/// PaperExchange forwards quote requests to a real client and simulates
/// order handling against the last quote it saw.
///
/// A limit order that crosses the last quote fills at once up to the
/// displayed depth; anything else rests until it is cancelled.
pub struct PaperExchange {
    inner: Arc<dyn ExchangeClient>,
    book: RwLock<Book>,
    next_id: AtomicU64,
}

impl PaperExchange {
    pub fn new(inner: Arc<dyn ExchangeClient>) -> Self {
        info!(exchange = %inner.name(), "paper trading enabled");
        Self {
            inner,
            book: RwLock::new(Book::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Quantity an order fills immediately against a quote.
    fn crossing_fill(request: &OrderRequest, quote: &PriceQuote) -> Decimal {
        let (crosses, depth) = match request.side {
            OrderSide::Buy => (request.price >= quote.ask, quote.ask_size),
            OrderSide::Sell => (request.price <= quote.bid, quote.bid_size),
        };

        if !crosses {
            return Decimal::ZERO;
        }
        match depth {
            Some(depth) => request.quantity.min(depth),
            None => request.quantity,
        }
    }

    fn find<'a>(book: &'a mut Book, order: &OrderRef) -> Option<&'a mut PaperOrder> {
        match order {
            OrderRef::Client(id) => book.orders.get_mut(id),
            OrderRef::Exchange(id) => book.orders.values_mut().find(|o| &o.exchange_id == id),
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn get_quote(&self, symbol: &str) -> Result<Option<PriceQuote>> {
        let quote = self.inner.get_quote(symbol).await?;
        if let Some(ref q) = quote {
            self.book
                .write()
                .await
                .quotes
                .insert(symbol.to_string(), q.clone());
        }
        Ok(quote)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<String> {
        let mut book = self.book.write().await;

        if let Some(existing) = book.orders.get(&request.client_order_id) {
            return Ok(existing.exchange_id.clone());
        }

        let quote = book.quotes.get(&request.symbol).ok_or_else(|| {
            ExchangeError::Api(format!("no reference quote for {}", request.symbol))
        })?;

        let filled = Self::crossing_fill(request, quote);
        let status = if filled >= request.quantity {
            OrderStatus::Filled
        } else if filled > Decimal::ZERO {
            OrderStatus::Partial
        } else {
            OrderStatus::Open
        };

        let exchange_id = format!("paper-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut report = OrderReport::new(status, filled);
        if filled > Decimal::ZERO {
            report.average_price = Some(request.price);
        }

        debug!(
            exchange = %self.inner.name(),
            order_id = %exchange_id,
            side = %request.side,
            price = %request.price,
            quantity = %request.quantity,
            filled = %filled,
            "paper order placed"
        );

        book.orders.insert(
            request.client_order_id.clone(),
            PaperOrder {
                exchange_id: exchange_id.clone(),
                quantity: request.quantity,
                report,
            },
        );

        Ok(exchange_id)
    }

    async fn get_order_status(&self, _symbol: &str, order: &OrderRef) -> Result<OrderReport> {
        let mut book = self.book.write().await;
        Self::find(&mut book, order)
            .map(|o| o.report.clone())
            .ok_or_else(|| ExchangeError::OrderNotFound(order.to_string()))
    }

    async fn cancel_order(&self, _symbol: &str, order: &OrderRef) -> Result<bool> {
        let mut book = self.book.write().await;
        let paper = Self::find(&mut book, order)
            .ok_or_else(|| ExchangeError::OrderNotFound(order.to_string()))?;

        if paper.report.status.is_terminal() {
            return Ok(false);
        }

        paper.report.status = if paper.report.filled_quantity >= paper.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::Cancelled
        };
        Ok(true)
    }
}
