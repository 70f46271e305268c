//! Frozen engine settings built once from the loaded configuration.

use std::time::Duration;

use rust_decimal::Decimal;

use super::RetryPolicy;
use crate::config::{Config, ConfigError, parse_decimal};
use crate::domain::FeeTable;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_LEG_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_FILL_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_CYCLE_DEADLINE: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RESULTS: usize = 5;
const DEFAULT_MAX_TRADES: usize = 1;
const DEFAULT_MIN_PROFIT_BPS: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
const DEFAULT_SLIPPAGE_BPS: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// EngineConfig carries every value the aggregator, scanner, executor and
/// cycle engine read.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Symbols fetched every cycle, in slot order.
    pub symbols: Vec<String>,
    pub fee_table: FeeTable,
    pub min_profit_bps: Decimal,
    pub slippage_margin_bps: Decimal,
    pub max_results_per_symbol: usize,
    /// Quantity cap used when an exchange reports no depth.
    pub default_max_quantity: Decimal,
    pub fetch_timeout: Duration,
    pub max_trades_per_cycle: usize,
    pub cycle_deadline: Duration,
    pub leg_timeout: Duration,
    pub fill_poll_interval: Duration,
    pub retry: RetryPolicy,
    /// False in scan-only mode.
    pub execute_trades: bool,
}

impl EngineConfig {
    /// Parses decimals, applies defaults and rejects values that would leave
    /// a cycle unbounded.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut fee_table = FeeTable::new();
        for (name, exchange) in config.exchanges.iter().filter(|(_, ex)| ex.enabled) {
            let field = format!("exchanges.{}.fee_bps", name);
            let fee = parse_decimal(&field, exchange.fee_bps.as_deref())?.ok_or_else(|| {
                ConfigError::Validation(format!("exchange {}: fee_bps is required", name))
            })?;
            fee_table.insert(name.clone(), fee);
        }

        let arbitrage = config.arbitrage.as_ref();
        let min_profit_bps = parse_decimal(
            "arbitrage.min_profit_bps",
            arbitrage.and_then(|a| a.min_profit_bps.as_deref()),
        )?
        .unwrap_or(DEFAULT_MIN_PROFIT_BPS);
        let slippage_margin_bps = parse_decimal(
            "arbitrage.slippage_margin_bps",
            arbitrage.and_then(|a| a.slippage_margin_bps.as_deref()),
        )?
        .unwrap_or(DEFAULT_SLIPPAGE_BPS);
        let default_max_quantity = parse_decimal(
            "arbitrage.default_max_quantity",
            arbitrage.and_then(|a| a.default_max_quantity.as_deref()),
        )?
        .unwrap_or(Decimal::ONE);
        let max_results_per_symbol = positive_or(
            arbitrage.and_then(|a| a.max_results_per_symbol),
            DEFAULT_MAX_RESULTS,
        );
        let fetch_timeout = non_zero_or(
            arbitrage.map(|a| a.fetch_timeout).unwrap_or_default(),
            DEFAULT_FETCH_TIMEOUT,
        );

        let execution = config.execution.as_ref();
        let leg_timeout = non_zero_or(
            execution.map(|e| e.leg_timeout).unwrap_or_default(),
            DEFAULT_LEG_TIMEOUT,
        );
        let fill_poll_interval = non_zero_or(
            execution.map(|e| e.fill_poll_interval).unwrap_or_default(),
            DEFAULT_FILL_POLL_INTERVAL,
        );
        let retry = RetryPolicy::from_config(execution.and_then(|e| e.retry.as_ref()));

        let cycle = config.cycle.as_ref();
        let max_trades_per_cycle =
            positive_or(cycle.and_then(|c| c.max_trades_per_cycle), DEFAULT_MAX_TRADES);
        let cycle_deadline = non_zero_or(
            cycle.map(|c| c.cycle_deadline).unwrap_or_default(),
            DEFAULT_CYCLE_DEADLINE,
        );

        if slippage_margin_bps.is_sign_negative() && !slippage_margin_bps.is_zero() {
            return Err(ConfigError::Validation(
                "arbitrage.slippage_margin_bps must not be negative".into(),
            ));
        }
        if default_max_quantity <= Decimal::ZERO {
            return Err(ConfigError::Validation(
                "arbitrage.default_max_quantity must be positive".into(),
            ));
        }
        if fetch_timeout >= cycle_deadline {
            return Err(ConfigError::Validation(format!(
                "arbitrage.fetch_timeout ({:?}) must be shorter than cycle.cycle_deadline ({:?})",
                fetch_timeout, cycle_deadline
            )));
        }
        if fill_poll_interval > leg_timeout {
            return Err(ConfigError::Validation(format!(
                "execution.fill_poll_interval ({:?}) must not exceed execution.leg_timeout ({:?})",
                fill_poll_interval, leg_timeout
            )));
        }

        Ok(Self {
            symbols: config.pairs.clone(),
            fee_table,
            min_profit_bps,
            slippage_margin_bps,
            max_results_per_symbol,
            default_max_quantity,
            fetch_timeout,
            max_trades_per_cycle,
            cycle_deadline,
            leg_timeout,
            fill_poll_interval,
            retry,
            execute_trades: true,
        })
    }

    /// Switches the engine to scan-only mode.
    pub fn scan_only(mut self) -> Self {
        self.execute_trades = false;
        self
    }
}

fn non_zero_or(value: Duration, default: Duration) -> Duration {
    if value.is_zero() { default } else { value }
}

fn positive_or(value: Option<i32>, default: usize) -> usize {
    value
        .and_then(|v| usize::try_from(v).ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    const BASE: &str = r#"
app: { name: test, env: development }
pairs: ["BTC/USDT", "ETH/USDT"]
exchanges:
  alpha: { enabled: true, fee_bps: "10" }
  beta: { enabled: true, fee_bps: "7.5" }
  gamma: { enabled: false, fee_bps: "1" }
"#;

    #[test]
    fn test_defaults() {
        let engine = EngineConfig::from_config(&config(BASE)).unwrap();

        assert_eq!(engine.symbols, vec!["BTC/USDT", "ETH/USDT"]);
        assert_eq!(engine.fee_table.fee_bps("alpha"), Some(Decimal::from(10)));
        assert_eq!(engine.fee_table.fee_bps("beta"), Some(Decimal::new(75, 1)));
        assert_eq!(engine.fee_table.fee_bps("gamma"), None);
        assert_eq!(engine.min_profit_bps, Decimal::from(50));
        assert_eq!(engine.slippage_margin_bps, Decimal::from(5));
        assert_eq!(engine.max_results_per_symbol, 5);
        assert_eq!(engine.max_trades_per_cycle, 1);
        assert_eq!(engine.fetch_timeout, Duration::from_secs(2));
        assert_eq!(engine.leg_timeout, Duration::from_secs(5));
        assert_eq!(engine.fill_poll_interval, Duration::from_millis(250));
        assert_eq!(engine.cycle_deadline, Duration::from_secs(30));
        assert_eq!(engine.retry.max_retries(), 3);
        assert!(engine.execute_trades);
        assert!(!engine.scan_only().execute_trades);
    }

    #[test]
    fn test_explicit_values() {
        let yaml = format!(
            "{}{}",
            BASE,
            r#"
arbitrage:
  min_profit_bps: "25"
  slippage_margin_bps: "2.5"
  max_results_per_symbol: 3
  default_max_quantity: "0.05"
  fetch_timeout: 500ms
execution:
  leg_timeout: 3s
  fill_poll_interval: 100ms
  retry: { max_retries: 1, initial_delay: 10ms, multiplier: 1.0 }
cycle:
  max_trades_per_cycle: 2
  cycle_deadline: 10s
"#
        );
        let engine = EngineConfig::from_config(&config(&yaml)).unwrap();

        assert_eq!(engine.min_profit_bps, Decimal::from(25));
        assert_eq!(engine.slippage_margin_bps, Decimal::new(25, 1));
        assert_eq!(engine.max_results_per_symbol, 3);
        assert_eq!(engine.default_max_quantity, Decimal::new(5, 2));
        assert_eq!(engine.fetch_timeout, Duration::from_millis(500));
        assert_eq!(engine.leg_timeout, Duration::from_secs(3));
        assert_eq!(engine.fill_poll_interval, Duration::from_millis(100));
        assert_eq!(engine.retry.max_attempts(), 2);
        assert_eq!(engine.retry.delay(2), Duration::from_millis(10));
        assert_eq!(engine.max_trades_per_cycle, 2);
        assert_eq!(engine.cycle_deadline, Duration::from_secs(10));
    }

    #[test]
    fn test_fetch_timeout_must_fit_deadline() {
        let yaml = format!(
            "{}{}",
            BASE, "arbitrage: { fetch_timeout: 10s }\ncycle: { cycle_deadline: 5s }\n"
        );
        assert!(matches!(
            EngineConfig::from_config(&config(&yaml)),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_decimal() {
        let yaml = format!("{}{}", BASE, "arbitrage: { min_profit_bps: \"lots\" }\n");
        assert!(matches!(
            EngineConfig::from_config(&config(&yaml)),
            Err(ConfigError::Decimal { .. })
        ));
    }

    #[test]
    fn test_non_positive_default_quantity() {
        let yaml = format!("{}{}", BASE, "arbitrage: { default_max_quantity: \"0\" }\n");
        assert!(matches!(
            EngineConfig::from_config(&config(&yaml)),
            Err(ConfigError::Validation(_))
        ));
    }
}
