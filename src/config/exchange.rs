//! Exchange configuration.

use serde::Deserialize;

/// Settings for a single exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Whether this exchange should be used.
    #[serde(default)]
    pub enabled: bool,
    /// Client implementation to use; defaults to the exchange name.
    pub kind: Option<String>,
    /// API key (loaded from environment variable).
    #[serde(skip)]
    pub api_key: String,
    /// API secret (loaded from environment variable).
    #[serde(skip)]
    pub api_secret: String,
    /// Taker fee in basis points as a decimal string (e.g., "10" for 0.1%).
    pub fee_bps: Option<String>,
    /// Maximum API requests per minute.
    pub rate_limit: Option<i32>,
    /// Overrides the REST endpoint.
    pub base_url: Option<String>,
}

impl ExchangeConfig {
    /// Returns the client implementation name for the exchange registered under `name`.
    pub fn kind_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.kind.as_deref().unwrap_or(name)
    }
}
