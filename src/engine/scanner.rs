//! Cross-exchange spread detection over frozen snapshots.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use tracing::{debug, trace};

use super::{EngineConfig, SnapshotSet};
use crate::domain::{BPS_PER_UNIT, FeeTable, Opportunity, PriceQuote, PriceSnapshot};

/// Thresholds applied by the scanner.
#[derive(Debug, Clone)]
pub struct ScanParams {
    pub fee_table: FeeTable,
    pub slippage_margin_bps: Decimal,
    pub min_profit_bps: Decimal,
    pub max_results: usize,
    pub default_max_quantity: Decimal,
}

impl From<&EngineConfig> for ScanParams {
    fn from(config: &EngineConfig) -> Self {
        Self {
            fee_table: config.fee_table.clone(),
            slippage_margin_bps: config.slippage_margin_bps,
            min_profit_bps: config.min_profit_bps,
            max_results: config.max_results_per_symbol,
            default_max_quantity: config.default_max_quantity,
        }
    }
}

/// Finds every profitable buy/sell pairing in one snapshot.
///
/// Both directions of every pair of present quotes are evaluated. The result
/// is ordered by net spread (highest first, ties by buy then sell exchange
/// name) and holds at most `max_results` entries. The same snapshot always
/// yields the same output.
pub fn scan(snapshot: &PriceSnapshot, params: &ScanParams) -> Vec<Opportunity> {
    let quotes: Vec<&PriceQuote> = snapshot.present().collect();
    if quotes.len() < 2 {
        trace!(symbol = %snapshot.symbol(), quotes = quotes.len(), "not enough quotes to scan");
        for entry in snapshot.entries() {
            if let Some(reason) = snapshot.absence(&entry.exchange) {
                trace!(symbol = %snapshot.symbol(), exchange = %entry.exchange, reason = ?reason, "slot absent");
            }
        }
        return Vec::new();
    }

    let mut found = Vec::new();
    for buy in &quotes {
        for sell in &quotes {
            if buy.exchange == sell.exchange {
                continue;
            }
            if let Some(opportunity) = evaluate(snapshot, buy, sell, params) {
                found.push(opportunity);
            }
        }
    }

    found.sort_by(rank);
    found.truncate(params.max_results);

    if !found.is_empty() {
        debug!(
            symbol = %snapshot.symbol(),
            count = found.len(),
            best_bps = %found[0].expected_spread_bps,
            "opportunities found"
        );
    }

    found
}

/// Scans every snapshot of a set and merges the results into one ranked list.
pub fn scan_all(set: &SnapshotSet, params: &ScanParams) -> Vec<Opportunity> {
    let mut all: Vec<Opportunity> = set
        .snapshots
        .iter()
        .flat_map(|snapshot| scan(snapshot, params))
        .collect();
    all.sort_by(|a, b| rank(a, b).then_with(|| a.symbol.cmp(&b.symbol)));
    all
}

fn rank(a: &Opportunity, b: &Opportunity) -> Ordering {
    b.expected_spread_bps
        .cmp(&a.expected_spread_bps)
        .then_with(|| a.buy_exchange.cmp(&b.buy_exchange))
        .then_with(|| a.sell_exchange.cmp(&b.sell_exchange))
}

fn evaluate(
    snapshot: &PriceSnapshot,
    buy: &PriceQuote,
    sell: &PriceQuote,
    params: &ScanParams,
) -> Option<Opportunity> {
    let (Some(fee_buy), Some(fee_sell)) = (
        params.fee_table.fee_bps(&buy.exchange),
        params.fee_table.fee_bps(&sell.exchange),
    ) else {
        debug!(
            buy_exchange = %buy.exchange,
            sell_exchange = %sell.exchange,
            "no fee configured, pair skipped"
        );
        return None;
    };

    let gross_spread_bps = (sell.bid - buy.ask)
        .checked_div(buy.ask)?
        .checked_mul(BPS_PER_UNIT)?;
    let net_spread_bps = gross_spread_bps - fee_buy - fee_sell - params.slippage_margin_bps;
    if net_spread_bps <= params.min_profit_bps {
        return None;
    }

    let max_quantity = match (buy.ask_size, sell.bid_size) {
        (Some(ask_size), Some(bid_size)) => ask_size.min(bid_size),
        (Some(size), None) | (None, Some(size)) => size.min(params.default_max_quantity),
        (None, None) => params.default_max_quantity,
    };
    if max_quantity <= Decimal::ZERO {
        return None;
    }

    let detected_at = snapshot.taken_at();
    Some(Opportunity {
        id: Opportunity::make_id(snapshot.symbol(), &buy.exchange, &sell.exchange, detected_at),
        symbol: snapshot.symbol().to_string(),
        buy_exchange: buy.exchange.clone(),
        sell_exchange: sell.exchange.clone(),
        buy_price: buy.ask,
        sell_price: sell.bid,
        gross_spread_bps,
        expected_spread_bps: net_spread_bps,
        max_quantity,
        detected_at,
    })
}
