//! Manager for handling multiple exchange connections.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{error, info, warn};

use super::poloniex::PoloniexExchange;
use super::{ExchangeClient, ExchangeError, PaperExchange, Result};
use crate::config::{Config, ExchangeConfig};

/// Manager owns the configured exchange clients in a fixed order.
///
/// The order is the slot order of every price snapshot.
pub struct Manager {
    exchanges: Vec<Arc<dyn ExchangeClient>>,
}

impl Manager {
    /// Creates a manager over the given clients. Names must be unique.
    pub fn new(exchanges: Vec<Arc<dyn ExchangeClient>>) -> Result<Self> {
        if exchanges.is_empty() {
            return Err(ExchangeError::Internal("no exchanges configured".into()));
        }

        let mut seen = HashSet::new();
        for exchange in &exchanges {
            if !seen.insert(exchange.name().to_string()) {
                return Err(ExchangeError::Internal(format!(
                    "exchange {} registered twice",
                    exchange.name()
                )));
            }
        }

        Ok(Self { exchanges })
    }

    /// Creates a Manager from configuration.
    /// Only enabled exchanges are instantiated; with dry run enabled every
    /// client is wrapped in a paper trading layer.
    pub fn from_config(config: &Config) -> Result<Self> {
        let dry_run = config.dry_run();
        let mut exchanges = Vec::with_capacity(config.exchanges.len());

        for (name, exchange_config) in &config.exchanges {
            if !exchange_config.enabled {
                info!(exchange = %name, "skipping disabled exchange");
                continue;
            }

            info!(exchange = %name, kind = %exchange_config.kind_or(name), "loading exchange from config");

            let client = Self::create_exchange(name, exchange_config)?;
            let client = if dry_run {
                Arc::new(PaperExchange::new(client)) as Arc<dyn ExchangeClient>
            } else {
                client
            };
            exchanges.push(client);
        }

        if exchanges.len() < 2 {
            warn!(
                count = exchanges.len(),
                "fewer than two exchanges enabled, no spread can be found"
            );
        }

        Self::new(exchanges)
    }

    /// Factory method to create an exchange client based on its kind.
    fn create_exchange(name: &str, config: &ExchangeConfig) -> Result<Arc<dyn ExchangeClient>> {
        match config.kind_or(name).to_lowercase().as_str() {
            "poloniex" => {
                let client: Arc<dyn ExchangeClient> =
                    Arc::new(PoloniexExchange::from_config(name, config)?);
                Ok(client)
            }
            kind => Err(ExchangeError::Internal(format!(
                "unknown exchange kind {} for {}",
                kind, name
            ))),
        }
    }

    /// Exchange names in slot order.
    pub fn names(&self) -> Vec<String> {
        self.exchanges.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn clients(&self) -> &[Arc<dyn ExchangeClient>] {
        &self.exchanges
    }

    /// Connects all exchanges, stopping at the first failure.
    pub async fn connect_all(&self) -> Result<()> {
        for exchange in &self.exchanges {
            info!(exchange = %exchange.name(), "connecting to exchange");
            if let Err(e) = exchange.connect().await {
                error!(exchange = %exchange.name(), error = %e, "failed to connect to exchange");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Disconnects all exchanges. Failures are logged and skipped.
    pub async fn disconnect_all(&self) {
        for exchange in &self.exchanges {
            info!(exchange = %exchange.name(), "disconnecting from exchange");
            if let Err(e) = exchange.disconnect().await {
                error!(exchange = %exchange.name(), error = %e, "failed to disconnect from exchange");
            }
        }
    }

    /// Returns connection status for all exchanges.
    pub fn status(&self) -> BTreeMap<String, bool> {
        self.exchanges
            .iter()
            .map(|e| (e.name().to_string(), e.is_connected()))
            .collect()
    }
}
