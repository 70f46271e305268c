//! Scripted exchange client for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use super::{ExchangeClient, ExchangeError, Result};
use crate::domain::{OrderRef, OrderReport, OrderRequest, OrderSide, OrderStatus, PriceQuote};

/// What `get_quote` does for a symbol.
#[derive(Debug, Clone)]
pub enum QuoteScript {
    Quote(PriceQuote),
    Error,
    /// Never completes.
    Hang,
    None,
}

/// What happens to the next order placed on one side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderScript {
    /// Fills completely at once.
    Fill,
    /// Fills the given quantity and keeps working.
    Partial(Decimal),
    /// Placement is refused by the exchange.
    Reject,
    /// Accepted but never fills.
    NoFill,
    /// Placement times out; the order exists only if `fills` is true.
    SendTimeout { fills: bool },
    /// Placement times out but the order fills; the first `hidden_lookups`
    /// status calls do not find it yet.
    SlowIndex { hidden_lookups: u32 },
    /// Accepted, but every status and cancel call fails.
    StatusUnknown,
    /// Fills the given quantity and answers one status call; every later
    /// status and cancel call fails.
    PartialThenLost(Decimal),
}

#[derive(Debug, Clone)]
struct MockOrder {
    filled: Decimal,
    status: OrderStatus,
    /// Status calls still answered; `None` answers forever.
    answers_left: Option<u32>,
    hidden_lookups: u32,
}

impl MockOrder {
    fn new(filled: Decimal, status: OrderStatus) -> Self {
        Self {
            filled,
            status,
            answers_left: None,
            hidden_lookups: 0,
        }
    }

    fn unreachable(&self) -> bool {
        self.answers_left == Some(0)
    }
}

#[derive(Default)]
struct State {
    quotes: HashMap<String, QuoteScript>,
    scripts: HashMap<OrderSide, VecDeque<OrderScript>>,
    orders: HashMap<String, MockOrder>,
    exchange_ids: HashMap<String, String>,
    placed: HashMap<OrderSide, u32>,
    status_calls: u32,
    cancel_calls: u32,
    requests: Vec<OrderRequest>,
}

/// MockExchange answers from scripts set up by the test.
pub struct MockExchange {
    name: String,
    connected: AtomicBool,
    fail_connect: bool,
    state: Mutex<State>,
}

impl MockExchange {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            connected: AtomicBool::new(false),
            fail_connect: false,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Serves a valid quote with depth for a symbol.
    pub fn with_quote(self, symbol: &str, bid: i64, ask: i64, size: i64) -> Self {
        let quote = PriceQuote::new(
            &self.name,
            symbol,
            Decimal::from(bid),
            Decimal::from(ask),
            Utc::now(),
            1,
        )
        .with_depth(Decimal::from(size), Decimal::from(size));
        self.with_quote_script(symbol, QuoteScript::Quote(quote))
    }

    pub fn with_quote_script(self, symbol: &str, script: QuoteScript) -> Self {
        self.set_quote(symbol, script);
        self
    }

    /// Queues order behaviors for one side. Orders beyond the queue fill.
    pub fn with_orders(self, side: OrderSide, scripts: Vec<OrderScript>) -> Self {
        self.lock().scripts.entry(side).or_default().extend(scripts);
        self
    }

    pub fn set_quote(&self, symbol: &str, script: QuoteScript) {
        self.lock().quotes.insert(symbol.to_string(), script);
    }

    pub fn placed(&self, side: OrderSide) -> u32 {
        self.lock().placed.get(&side).copied().unwrap_or(0)
    }

    pub fn status_calls(&self) -> u32 {
        self.lock().status_calls
    }

    pub fn cancel_calls(&self) -> u32 {
        self.lock().cancel_calls
    }

    /// Every order request received, in order.
    pub fn requests(&self) -> Vec<OrderRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn find<'a>(state: &'a mut State, order: &OrderRef) -> Option<&'a mut MockOrder> {
        let client_id = match order {
            OrderRef::Client(id) => id.clone(),
            OrderRef::Exchange(id) => state.exchange_ids.get(id)?.clone(),
        };
        state.orders.get_mut(&client_id)
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        if self.fail_connect {
            return Err(ExchangeError::Connection("mock connection failure".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_quote(&self, symbol: &str) -> Result<Option<PriceQuote>> {
        let script = self
            .lock()
            .quotes
            .get(symbol)
            .cloned()
            .unwrap_or(QuoteScript::None);

        match script {
            QuoteScript::Quote(quote) => Ok(Some(quote)),
            QuoteScript::Error => Err(ExchangeError::Api("mock quote failure".into())),
            QuoteScript::Hang => std::future::pending().await,
            QuoteScript::None => Ok(None),
        }
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<String> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        *state.placed.entry(request.side).or_default() += 1;

        let script = state
            .scripts
            .get_mut(&request.side)
            .and_then(|q| q.pop_front())
            .unwrap_or(OrderScript::Fill);

        let (filled, status, answers_left) = match script {
            OrderScript::Fill => (request.quantity, OrderStatus::Filled, None),
            OrderScript::Partial(qty) => (qty, OrderStatus::Partial, None),
            OrderScript::Reject => {
                return Err(ExchangeError::Api("mock order rejected".into()));
            }
            OrderScript::NoFill => (Decimal::ZERO, OrderStatus::Open, None),
            OrderScript::SendTimeout { fills } => {
                if fills {
                    state.orders.insert(
                        request.client_order_id.clone(),
                        MockOrder::new(request.quantity, OrderStatus::Filled),
                    );
                }
                return Err(ExchangeError::Timeout("mock send timeout".into()));
            }
            OrderScript::SlowIndex { hidden_lookups } => {
                let mut order = MockOrder::new(request.quantity, OrderStatus::Filled);
                order.hidden_lookups = hidden_lookups;
                state.orders.insert(request.client_order_id.clone(), order);
                return Err(ExchangeError::Timeout("mock send timeout".into()));
            }
            OrderScript::StatusUnknown => (Decimal::ZERO, OrderStatus::Open, Some(0)),
            OrderScript::PartialThenLost(qty) => (qty, OrderStatus::Partial, Some(1)),
        };

        let exchange_id = format!("{}-{}", self.name, state.requests.len());
        state
            .exchange_ids
            .insert(exchange_id.clone(), request.client_order_id.clone());
        let mut order = MockOrder::new(filled, status);
        order.answers_left = answers_left;
        state.orders.insert(request.client_order_id.clone(), order);

        Ok(exchange_id)
    }

    async fn get_order_status(&self, _symbol: &str, order: &OrderRef) -> Result<OrderReport> {
        let mut state = self.lock();
        state.status_calls += 1;

        match Self::find(&mut state, order) {
            Some(o) if o.hidden_lookups > 0 => {
                o.hidden_lookups -= 1;
                Err(ExchangeError::OrderNotFound(order.to_string()))
            }
            Some(o) if o.unreachable() => Err(ExchangeError::Connection("mock status failure".into())),
            Some(o) => {
                if let Some(left) = o.answers_left.as_mut() {
                    *left -= 1;
                }
                Ok(OrderReport::new(o.status, o.filled))
            }
            None => Err(ExchangeError::OrderNotFound(order.to_string())),
        }
    }

    async fn cancel_order(&self, _symbol: &str, order: &OrderRef) -> Result<bool> {
        let mut state = self.lock();
        state.cancel_calls += 1;

        match Self::find(&mut state, order) {
            Some(o) if o.hidden_lookups > 0 => Err(ExchangeError::OrderNotFound(order.to_string())),
            Some(o) if o.unreachable() => Err(ExchangeError::Connection("mock cancel failure".into())),
            Some(o) if o.status.is_terminal() => Ok(false),
            Some(o) => {
                o.status = OrderStatus::Cancelled;
                Ok(true)
            }
            None => Err(ExchangeError::OrderNotFound(order.to_string())),
        }
    }
}
