//! Opportunity detection configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Spread detection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ArbitrageConfig {
    /// Minimum net spread in bps for an opportunity (e.g., "50").
    pub min_profit_bps: Option<String>,
    /// Safety margin in bps subtracted from every spread (e.g., "5").
    pub slippage_margin_bps: Option<String>,
    /// Maximum opportunities kept per symbol and cycle.
    pub max_results_per_symbol: Option<i32>,
    /// Trade size used when an exchange reports no depth (e.g., "0.01").
    pub default_max_quantity: Option<String>,
    /// Timeout for each quote fetch (default: 2s).
    #[serde(default, with = "duration")]
    pub fetch_timeout: Duration,
}
