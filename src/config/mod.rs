//! Configuration loading and validation for the spread capture engine.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for sensitive credentials.

mod app;
mod arbitrage;
mod cycle;
mod duration;
mod error;
mod exchange;
mod execution;
mod notification;
mod storage;

pub use app::AppConfig;
pub use arbitrage::ArbitrageConfig;
pub use cycle::CycleConfig;
pub use error::ConfigError;
pub use exchange::ExchangeConfig;
pub use execution::{ExecutionConfig, RetryConfig};
pub use notification::{NotificationConfig, TelegramConfig};
pub use storage::StorageConfig;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::{env, fs};

/// Root configuration structure.
///
/// Required sections: app, exchanges, pairs.
/// Optional sections: arbitrage, execution, cycle, notification, storage.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Maps exchange names to their configurations. Ordered so that snapshot
    /// slots are laid out the same way on every run.
    pub exchanges: BTreeMap<String, ExchangeConfig>,
    /// List of trading pairs to monitor (e.g., "BTC/USDT").
    pub pairs: Vec<String>,
    /// Spread detection thresholds (optional).
    pub arbitrage: Option<ArbitrageConfig>,
    /// Leg timeouts and retries (optional).
    pub execution: Option<ExecutionConfig>,
    /// Cycle bounds and driver loop (optional).
    pub cycle: Option<CycleConfig>,
    /// Alert channels like Telegram (optional).
    pub notification: Option<NotificationConfig>,
    /// Trade journal (optional).
    pub storage: Option<StorageConfig>,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` file (if exists),
    /// then loads YAML config and credentials from environment variables:
    /// - `{EXCHANGE}_API_KEY`, `{EXCHANGE}_API_SECRET`
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`, `TELEGRAM_ERROR_CHAT_ID`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Self::load_with(path, false)
    }

    /// Same as [`Config::load`], optionally forcing paper trading before
    /// validation so that credentials are not required.
    pub fn load_with(path: &str, force_dry_run: bool) -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore error if not found)
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        if force_dry_run {
            config.enable_dry_run();
        }

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Names of enabled exchanges, in slot order.
    pub fn enabled_exchanges(&self) -> Vec<String> {
        self.exchanges
            .iter()
            .filter(|(_, ex)| ex.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns true if orders should be simulated.
    pub fn dry_run(&self) -> bool {
        self.cycle.as_ref().is_some_and(|c| c.dry_run)
    }

    /// Switches order placement to paper trading.
    pub fn enable_dry_run(&mut self) {
        self.cycle.get_or_insert_with(CycleConfig::default).dry_run = true;
    }

    /// Load credentials from environment variables.
    fn load_credentials_from_env(&mut self) {
        for (name, exchange) in self.exchanges.iter_mut() {
            if !exchange.enabled {
                continue;
            }

            let env_prefix = env_prefix(name);
            exchange.api_key = env::var(format!("{}_API_KEY", env_prefix)).unwrap_or_default();
            exchange.api_secret =
                env::var(format!("{}_API_SECRET", env_prefix)).unwrap_or_default();
        }

        if let Some(ref mut notification) = self.notification {
            if let Some(ref mut telegram) = notification.telegram {
                if telegram.enabled {
                    telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
                    telegram.chat_id = env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
                    telegram.error_chat_id = env::var("TELEGRAM_ERROR_CHAT_ID").unwrap_or_default();
                }
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        if self.pairs.is_empty() {
            return Err(ConfigError::Validation(
                "at least one trading pair is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        for pair in &self.pairs {
            if !pair.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "pair {} must be in BASE/QUOTE format",
                    pair
                )));
            }
            if !seen.insert(pair.as_str()) {
                return Err(ConfigError::Validation(format!("duplicate pair {}", pair)));
            }
        }

        let requires_credentials = self.app.requires_credentials() && !self.dry_run();

        let mut enabled_exchanges = 0;
        for (name, exchange) in &self.exchanges {
            if !exchange.enabled {
                continue;
            }
            enabled_exchanges += 1;

            let field = format!("exchanges.{}.fee_bps", name);
            match parse_decimal(&field, exchange.fee_bps.as_deref())? {
                None => {
                    return Err(ConfigError::Validation(format!(
                        "exchange {}: fee_bps is required",
                        name
                    )));
                }
                Some(fee) if fee.is_sign_negative() => {
                    return Err(ConfigError::Validation(format!(
                        "exchange {}: fee_bps must not be negative",
                        name
                    )));
                }
                Some(_) => {}
            }

            // Only require credentials in production/staging
            if requires_credentials && (exchange.api_key.is_empty() || exchange.api_secret.is_empty())
            {
                return Err(ConfigError::Validation(format!(
                    "exchange {}: API credentials not found (set {}_API_KEY and {}_API_SECRET env vars)",
                    name,
                    env_prefix(name),
                    env_prefix(name)
                )));
            }
        }

        if enabled_exchanges == 0 {
            return Err(ConfigError::Validation(
                "at least one exchange must be enabled".into(),
            ));
        }

        if let Some(ref cycle) = self.cycle {
            if let Some(max_trades) = cycle.max_trades_per_cycle {
                if max_trades <= 0 {
                    return Err(ConfigError::Validation(
                        "cycle.max_trades_per_cycle must be positive".into(),
                    ));
                }
            }
        }

        if let Some(ref arbitrage) = self.arbitrage {
            if let Some(max_results) = arbitrage.max_results_per_symbol {
                if max_results <= 0 {
                    return Err(ConfigError::Validation(
                        "arbitrage.max_results_per_symbol must be positive".into(),
                    ));
                }
            }
        }

        if let Some(retry) = self.execution.as_ref().and_then(|e| e.retry.as_ref()) {
            if retry.max_retries.is_some_and(|r| r < 0) {
                return Err(ConfigError::Validation(
                    "execution.retry.max_retries must not be negative".into(),
                ));
            }
            if retry.multiplier.is_some_and(|m| m < 1.0) {
                return Err(ConfigError::Validation(
                    "execution.retry.multiplier must be at least 1.0".into(),
                ));
            }
        }

        Ok(())
    }
}

/// Environment variable prefix for an exchange name ("gate.io" -> "GATE_IO").
fn env_prefix(name: &str) -> String {
    name.to_uppercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Parses an optional decimal string field.
pub(crate) fn parse_decimal(field: &str, value: Option<&str>) -> Result<Option<Decimal>, ConfigError> {
    match value {
        None => Ok(None),
        Some(s) => Decimal::from_str(s.trim())
            .map(Some)
            .map_err(|_| ConfigError::Decimal {
                field: field.to_string(),
                value: s.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests;
