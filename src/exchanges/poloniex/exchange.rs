use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ExchangeConfig;
use crate::domain::{OrderRef, OrderReport, OrderRequest, OrderSide, PriceQuote};
use crate::exchanges::poloniex::{Client, ClientError};
use crate::exchanges::utils::{
    pair_to_symbol, parse_best_level, parse_decimal_or_zero, parse_order_status,
};
use crate::exchanges::{ExchangeClient, ExchangeError, Result};

/// Maximum acceptable clock drift between local and server time.
const MAX_CLOCK_DRIFT: Duration = Duration::from_secs(5);

/// Book depth requested for quotes; only the best level is used.
const QUOTE_DEPTH: &str = "5";

/// Poloniex API error codes with a specific meaning.
const CODE_INSUFFICIENT_FUNDS: i32 = 21603;
const CODE_ORDER_NOT_FOUND: i32 = 21606;
const CODE_SYMBOL_NOT_SUPPORTED: i32 = 21601;

/// Poloniex exchange implementation.
pub struct PoloniexExchange {
    name: String,
    client: Client,
    connected: AtomicBool,
    sequence: AtomicU64,
}

impl PoloniexExchange {
    /// Creates a client registered under `name` from its exchange config.
    pub fn from_config(name: &str, config: &ExchangeConfig) -> Result<Self> {
        let client = Client::from_config(config)
            .map_err(|e| ExchangeError::Internal(format!("create {} client: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            client,
            connected: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
        })
    }

    fn order_endpoint(order: &OrderRef) -> String {
        format!("/orders/{}", order)
    }
}

#[async_trait]
impl ExchangeClient for PoloniexExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        let server_time = self
            .client
            .get_server_time()
            .await
            .map_err(|e| ExchangeError::Connection(format!("connect to {}: {}", self.name, e)))?;

        let drift = (Utc::now() - server_time).abs();

        info!(
            exchange = %self.name,
            server_time = %server_time,
            clock_drift = ?drift,
            requests = self.client.request_count(),
            rate_limit = self.client.rate_limit(),
            "connected to poloniex"
        );

        if drift > chrono::Duration::from_std(MAX_CLOCK_DRIFT).unwrap_or_default() {
            warn!(exchange = %self.name, drift = ?drift, "significant clock drift detected");
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        debug!(exchange = %self.name, "disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_quote(&self, symbol: &str) -> Result<Option<PriceQuote>> {
        let endpoint = format!("/markets/{}/orderBook", pair_to_symbol(symbol));

        let mut params = HashMap::new();
        params.insert("limit".to_string(), QUOTE_DEPTH.to_string());

        let body = self
            .client
            .request(Method::GET, &endpoint, Some(params), false)
            .await
            .map_err(|e| map_client_error(e, symbol))?;

        let resp: OrderbookResponse = serde_json::from_slice(&body)
            .map_err(|e| ExchangeError::Api(format!("parse orderbook: {}", e)))?;

        let sequence_no = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(resp.to_quote(&self.name, symbol, sequence_no))
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<String> {
        let side = match request.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };

        let mut params = HashMap::new();
        params.insert("symbol".to_string(), pair_to_symbol(&request.symbol));
        params.insert("side".to_string(), side.to_string());
        params.insert("type".to_string(), "LIMIT".to_string());
        params.insert("price".to_string(), request.price.to_string());
        params.insert("quantity".to_string(), request.quantity.to_string());
        params.insert("timeInForce".to_string(), "IOC".to_string());
        params.insert("clientOrderId".to_string(), request.client_order_id.clone());

        let body = self
            .client
            .request(Method::POST, "/orders", Some(params), true)
            .await
            .map_err(|e| map_client_error(e, &request.symbol))?;

        let resp: PlaceOrderResponse = serde_json::from_slice(&body)
            .map_err(|e| ExchangeError::Api(format!("parse order response: {}", e)))?;

        debug!(
            exchange = %self.name,
            order_id = %resp.id,
            client_order_id = %request.client_order_id,
            "order placed"
        );

        Ok(resp.id)
    }

    async fn get_order_status(&self, symbol: &str, order: &OrderRef) -> Result<OrderReport> {
        let body = self
            .client
            .request(Method::GET, &Self::order_endpoint(order), None, true)
            .await
            .map_err(|e| map_client_error(e, symbol))?;

        let info: OrderInfo = serde_json::from_slice(&body)
            .map_err(|e| ExchangeError::Api(format!("parse order: {}", e)))?;

        Ok(info.to_report())
    }

    async fn cancel_order(&self, symbol: &str, order: &OrderRef) -> Result<bool> {
        match self
            .client
            .request(Method::DELETE, &Self::order_endpoint(order), None, true)
            .await
        {
            Ok(_) => Ok(true),
            Err(ClientError::Api(api_err)) if api_err.code == CODE_ORDER_NOT_FOUND => {
                debug!(exchange = %self.name, order = %order, "order no longer cancellable");
                Ok(false)
            }
            Err(e) => Err(map_client_error(e, symbol)),
        }
    }
}

/// Poloniex orderbook response.
#[derive(Debug, Deserialize)]
struct OrderbookResponse {
    time: i64,
    asks: Vec<String>,
    bids: Vec<String>,
    ts: i64,
}

impl OrderbookResponse {
    fn to_quote(&self, exchange: &str, symbol: &str, sequence_no: u64) -> Option<PriceQuote> {
        let (bid, bid_size) = parse_best_level(&self.bids)?;
        let (ask, ask_size) = parse_best_level(&self.asks)?;
        let timestamp_ms = if self.ts != 0 { self.ts } else { self.time };
        let timestamp = DateTime::from_timestamp_millis(timestamp_ms).unwrap_or_else(Utc::now);

        Some(
            PriceQuote::new(exchange, symbol, bid, ask, timestamp, sequence_no)
                .with_depth(bid_size, ask_size),
        )
    }
}

/// Poloniex place order response.
#[derive(Debug, Deserialize)]
struct PlaceOrderResponse {
    id: String,
}

/// Poloniex order info response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderInfo {
    state: String,
    #[serde(default)]
    filled_quantity: String,
    #[serde(default)]
    avg_price: String,
}

impl OrderInfo {
    fn to_report(&self) -> OrderReport {
        let average_price = Some(parse_decimal_or_zero(&self.avg_price)).filter(|p| !p.is_zero());

        OrderReport {
            status: parse_order_status(&self.state),
            filled_quantity: parse_decimal_or_zero(&self.filled_quantity),
            average_price,
        }
    }
}

/// Maps Poloniex client errors to exchange errors.
fn map_client_error(err: ClientError, pair: &str) -> ExchangeError {
    match err {
        ClientError::Api(api_err) => match api_err.code {
            CODE_INSUFFICIENT_FUNDS => ExchangeError::InsufficientFunds,
            CODE_ORDER_NOT_FOUND => ExchangeError::OrderNotFound(pair.to_string()),
            CODE_SYMBOL_NOT_SUPPORTED => ExchangeError::PairNotSupported(pair.to_string()),
            _ => ExchangeError::Api(format!("poloniex error for {}: {}", pair, api_err)),
        },
        ClientError::RateLimitExceeded { .. } => {
            ExchangeError::Api(format!("rate limit exceeded for {}", pair))
        }
        ClientError::Request(e) if e.is_timeout() => ExchangeError::Timeout(e.to_string()),
        ClientError::Request(e) => ExchangeError::Connection(e.to_string()),
        ClientError::Header(e) => ExchangeError::Internal(e.to_string()),
        ClientError::Json(e) => ExchangeError::Api(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderStatus;
    use rust_decimal::Decimal;

    #[test]
    fn test_orderbook_to_quote() {
        let resp: OrderbookResponse = serde_json::from_str(
            r#"{"time":1700000000000,"scale":"0.01","asks":["101.5","2","101.6","1"],"bids":["101.2","3"],"ts":1700000000123}"#,
        )
        .unwrap();

        let quote = resp.to_quote("poloniex", "BTC/USDT", 7).unwrap();
        assert_eq!(quote.bid, Decimal::new(1012, 1));
        assert_eq!(quote.ask, Decimal::new(1015, 1));
        assert_eq!(quote.bid_size, Some(Decimal::from(3)));
        assert_eq!(quote.ask_size, Some(Decimal::from(2)));
        assert_eq!(quote.sequence_no, 7);
        assert_eq!(quote.timestamp.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_empty_book_has_no_quote() {
        let resp: OrderbookResponse =
            serde_json::from_str(r#"{"time":1,"asks":[],"bids":["1","1"],"ts":0}"#).unwrap();
        assert!(resp.to_quote("poloniex", "BTC/USDT", 1).is_none());
    }

    #[test]
    fn test_order_info_to_report() {
        let info: OrderInfo = serde_json::from_str(
            r#"{"id":"1","clientOrderId":"c","state":"PARTIALLY_CANCELED","filledQuantity":"0.4","avgPrice":"100.1"}"#,
        )
        .unwrap();

        let report = info.to_report();
        assert_eq!(report.status, OrderStatus::Cancelled);
        assert_eq!(report.filled_quantity, Decimal::new(4, 1));
        assert_eq!(report.average_price, Some(Decimal::new(1001, 1)));
    }

    #[test]
    fn test_order_endpoint_by_client_id() {
        assert_eq!(
            PoloniexExchange::order_endpoint(&OrderRef::Client("abc".to_string())),
            "/orders/cid:abc"
        );
        assert_eq!(
            PoloniexExchange::order_endpoint(&OrderRef::Exchange("42".to_string())),
            "/orders/42"
        );
    }

    #[test]
    fn test_map_insufficient_funds() {
        let err = map_client_error(
            ClientError::Api(crate::exchanges::poloniex::client::ApiError {
                code: CODE_INSUFFICIENT_FUNDS,
                message: "no".to_string(),
            }),
            "BTC/USDT",
        );
        assert!(matches!(err, ExchangeError::InsufficientFunds));
        assert!(!err.is_ambiguous());
    }
}
