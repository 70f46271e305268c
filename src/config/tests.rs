//! Tests for config module.

use super::*;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

// ==================== Duration parsing tests ====================

#[test]
fn test_parse_duration_seconds() {
    let d = duration::parse_duration("30s").unwrap();
    assert_eq!(d, Duration::from_secs(30));
}

#[test]
fn test_parse_duration_minutes() {
    let d = duration::parse_duration("5m").unwrap();
    assert_eq!(d, Duration::from_secs(300));
}

#[test]
fn test_parse_duration_milliseconds() {
    let d = duration::parse_duration("250ms").unwrap();
    assert_eq!(d, Duration::from_millis(250));
}

#[test]
fn test_parse_duration_empty() {
    let d = duration::parse_duration("").unwrap();
    assert_eq!(d, Duration::ZERO);
}

#[test]
fn test_parse_duration_invalid_unit() {
    let result = duration::parse_duration("10x");
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("unknown duration unit"));
}

#[test]
fn test_parse_duration_fractional() {
    let d = duration::parse_duration("1.5s").unwrap();
    assert_eq!(d, Duration::from_millis(1500));
}

// ==================== YAML field loading tests ====================

/// Parse config from YAML string (for testing).
fn from_yaml(yaml: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(yaml)?;
    Ok(config)
}

fn minimal_valid_yaml() -> String {
    r#"
app:
  name: testbot
  env: development

exchanges:
  testex:
    enabled: true
    fee_bps: "10"

pairs:
  - BTC/USDT
"#
    .to_string()
}

#[test]
fn test_load_app_fields() {
    let yaml = r#"
app:
  name: mybot
  env: production
  log_level: debug

exchanges:
  poloniex:
    enabled: false

pairs:
  - ETH/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    assert_eq!(cfg.app.name, "mybot");
    assert_eq!(cfg.app.env, "production");
    assert_eq!(cfg.app.log_level, Some("debug".to_string()));
    assert!(cfg.app.requires_credentials());
}

#[test]
fn test_load_exchange_fields() {
    let yaml = r#"
app:
  name: test
  env: development

exchanges:
  polo_main:
    enabled: true
    kind: poloniex
    fee_bps: "15.5"
    rate_limit: 1200
    base_url: "http://localhost:8080"

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let ex = cfg.exchanges.get("polo_main").unwrap();
    assert!(ex.enabled);
    assert_eq!(ex.kind_or("polo_main"), "poloniex");
    assert_eq!(ex.fee_bps, Some("15.5".to_string()));
    assert_eq!(ex.rate_limit, Some(1200));
    assert_eq!(ex.base_url.as_deref(), Some("http://localhost:8080"));
}

#[test]
fn test_exchange_kind_defaults_to_name() {
    let cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    let ex = cfg.exchanges.get("testex").unwrap();
    assert_eq!(ex.kind_or("testex"), "testex");
}

#[test]
fn test_load_arbitrage_fields() {
    let yaml = r#"
app:
  name: test
  env: dev

exchanges:
  ex:
    enabled: false

arbitrage:
  min_profit_bps: "50"
  slippage_margin_bps: "5"
  max_results_per_symbol: 3
  default_max_quantity: "0.01"
  fetch_timeout: 750ms

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let arb = cfg.arbitrage.unwrap();
    assert_eq!(arb.min_profit_bps, Some("50".to_string()));
    assert_eq!(arb.slippage_margin_bps, Some("5".to_string()));
    assert_eq!(arb.max_results_per_symbol, Some(3));
    assert_eq!(arb.default_max_quantity, Some("0.01".to_string()));
    assert_eq!(arb.fetch_timeout, Duration::from_millis(750));
}

#[test]
fn test_load_execution_fields() {
    let yaml = r#"
app:
  name: test
  env: dev

exchanges:
  ex:
    enabled: false

execution:
  leg_timeout: 5s
  fill_poll_interval: 200ms
  retry:
    max_retries: 3
    initial_delay: 100ms
    max_delay: 1s
    multiplier: 2.0

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let exec = cfg.execution.unwrap();
    assert_eq!(exec.leg_timeout, Duration::from_secs(5));
    assert_eq!(exec.fill_poll_interval, Duration::from_millis(200));

    let retry = exec.retry.unwrap();
    assert_eq!(retry.max_retries, Some(3));
    assert_eq!(retry.initial_delay, Duration::from_millis(100));
    assert_eq!(retry.max_delay, Duration::from_secs(1));
    assert_eq!(retry.multiplier, Some(2.0));
}

#[test]
fn test_load_cycle_fields() {
    let yaml = r#"
app:
  name: test
  env: dev

exchanges:
  ex:
    enabled: false

cycle:
  max_trades_per_cycle: 2
  cycle_deadline: 20s
  cycle_interval: 500ms
  max_cycles: 10
  dry_run: true

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    assert!(cfg.dry_run());
    let cycle = cfg.cycle.unwrap();
    assert_eq!(cycle.max_trades_per_cycle, Some(2));
    assert_eq!(cycle.cycle_deadline, Duration::from_secs(20));
    assert_eq!(cycle.cycle_interval, Duration::from_millis(500));
    assert_eq!(cycle.max_cycles, Some(10));
}

#[test]
fn test_load_notification_fields() {
    let yaml = r#"
app:
  name: test
  env: dev

exchanges:
  ex:
    enabled: false

notification:
  telegram:
    enabled: true
    notify_executions: true
    notify_errors: false
    notify_overview: true
    overview_interval: 1h

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let tg = cfg.notification.unwrap().telegram.unwrap();
    assert!(tg.enabled);
    assert!(tg.notify_executions);
    assert!(!tg.notify_errors);
    assert!(tg.notify_overview);
    assert_eq!(tg.overview_interval, Duration::from_secs(3600));
}

#[test]
fn test_load_storage_fields() {
    let yaml = r#"
app:
  name: test
  env: dev

exchanges:
  ex:
    enabled: false

storage:
  enabled: true
  path: "journal.db"
  max_connections: 2

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let storage = cfg.storage.unwrap();
    assert!(storage.enabled);
    assert_eq!(storage.path, Some("journal.db".to_string()));
    assert_eq!(storage.max_connections, Some(2));
}

#[test]
fn test_enabled_exchanges_are_sorted() {
    let yaml = r#"
app:
  name: test
  env: development

exchanges:
  zeta:
    enabled: true
    fee_bps: "10"
  alpha:
    enabled: true
    fee_bps: "10"
  mid:
    enabled: false

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();
    assert_eq!(cfg.enabled_exchanges(), vec!["alpha", "zeta"]);
}

// ==================== Credentials loading tests ====================

#[test]
fn test_load_credentials_from_env() {
    let yaml = r#"
app:
  name: test
  env: dev

exchanges:
  credex:
    enabled: true
    fee_bps: "10"

notification:
  telegram:
    enabled: true

pairs:
  - BTC/USDT
"#;
    let mut cfg = from_yaml(yaml).unwrap();

    // Set env vars (unsafe because modifying env is not thread-safe)
    unsafe {
        env::set_var("CREDEX_API_KEY", "test_key_123");
        env::set_var("CREDEX_API_SECRET", "test_secret_456");
        env::set_var("TELEGRAM_BOT_TOKEN", "bot_token_789");
        env::set_var("TELEGRAM_CHAT_ID", "chat_id_012");
        env::set_var("TELEGRAM_ERROR_CHAT_ID", "error_chat_345");
    }

    cfg.load_credentials_from_env();

    let ex = cfg.exchanges.get("credex").unwrap();
    assert_eq!(ex.api_key, "test_key_123");
    assert_eq!(ex.api_secret, "test_secret_456");

    let tg = cfg.notification.unwrap().telegram.unwrap();
    assert_eq!(tg.bot_token, "bot_token_789");
    assert_eq!(tg.chat_id, "chat_id_012");
    assert_eq!(tg.error_chat_id, "error_chat_345");

    unsafe {
        env::remove_var("CREDEX_API_KEY");
        env::remove_var("CREDEX_API_SECRET");
        env::remove_var("TELEGRAM_BOT_TOKEN");
        env::remove_var("TELEGRAM_CHAT_ID");
        env::remove_var("TELEGRAM_ERROR_CHAT_ID");
    }
}

#[test]
fn test_env_prefix_sanitizes_name() {
    assert_eq!(env_prefix("gate.io"), "GATE_IO");
    assert_eq!(env_prefix("poloniex"), "POLONIEX");
}

// ==================== Validation tests ====================

#[test]
fn test_validate_empty_app_name() {
    let yaml = r#"
app:
  name: ""
  env: development

exchanges:
  ex:
    enabled: true
    fee_bps: "10"

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("app.name is required"));
}

#[test]
fn test_validate_empty_pairs() {
    let yaml = r#"
app:
  name: test
  env: development

exchanges:
  ex:
    enabled: true
    fee_bps: "10"

pairs: []
"#;
    let cfg = from_yaml(yaml).unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("at least one trading pair"));
}

#[test]
fn test_validate_duplicate_pairs() {
    let yaml = r#"
app:
  name: test
  env: development

exchanges:
  ex:
    enabled: true
    fee_bps: "10"

pairs:
  - BTC/USDT
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("duplicate pair"));
}

#[test]
fn test_validate_pair_format() {
    let yaml = r#"
app:
  name: test
  env: development

exchanges:
  ex:
    enabled: true
    fee_bps: "10"

pairs:
  - BTCUSDT
"#;
    let cfg = from_yaml(yaml).unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("BASE/QUOTE"));
}

#[test]
fn test_validate_no_enabled_exchanges() {
    let yaml = r#"
app:
  name: test
  env: development

exchanges:
  ex:
    enabled: false

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("at least one exchange must be enabled"));
}

#[test]
fn test_validate_missing_fee() {
    let yaml = r#"
app:
  name: test
  env: development

exchanges:
  ex:
    enabled: true

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("fee_bps is required"));
}

#[test]
fn test_validate_malformed_fee() {
    let yaml = r#"
app:
  name: test
  env: development

exchanges:
  ex:
    enabled: true
    fee_bps: "ten"

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(matches!(err, ConfigError::Decimal { .. }));
}

#[test]
fn test_validate_non_positive_max_trades() {
    let yaml = r#"
app:
  name: test
  env: development

exchanges:
  ex:
    enabled: true
    fee_bps: "10"

cycle:
  max_trades_per_cycle: 0

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("max_trades_per_cycle must be positive"));
}

#[test]
fn test_validate_multiplier_below_one() {
    let yaml = r#"
app:
  name: test
  env: development

exchanges:
  ex:
    enabled: true
    fee_bps: "10"

execution:
  retry:
    multiplier: 0.5

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("multiplier must be at least 1.0"));
}

#[test]
fn test_validate_require_credentials_in_staging() {
    let yaml = r#"
app:
  name: test
  env: staging

exchanges:
  binance:
    enabled: true
    fee_bps: "10"

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("API credentials not found"));
}

#[test]
fn test_validate_dry_run_skips_credentials() {
    let yaml = r#"
app:
  name: test
  env: production

exchanges:
  binance:
    enabled: true
    fee_bps: "10"

cycle:
  dry_run: true

pairs:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_validate_pass_with_credentials_in_production() {
    let yaml = r#"
app:
  name: test
  env: production

exchanges:
  binance:
    enabled: true
    fee_bps: "10"

pairs:
  - BTC/USDT
"#;
    let mut cfg = from_yaml(yaml).unwrap();
    cfg.exchanges.get_mut("binance").unwrap().api_key = "key".to_string();
    cfg.exchanges.get_mut("binance").unwrap().api_secret = "secret".to_string();

    assert!(cfg.validate().is_ok());
}

// ==================== File loading tests ====================

#[test]
fn test_load_from_file_development() {
    let yaml = minimal_valid_yaml();

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let cfg = Config::load(file.path().to_str().unwrap()).unwrap();

    assert_eq!(cfg.app.name, "testbot");
    assert_eq!(cfg.pairs, vec!["BTC/USDT"]);
    assert!(cfg.exchanges.get("testex").unwrap().api_key.is_empty());
}

#[test]
fn test_load_file_not_found() {
    let result = Config::load("nonexistent_config.yaml");
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("failed to read config file"));
}

#[test]
fn test_parse_decimal_helper() {
    assert_eq!(parse_decimal("f", None).unwrap(), None);
    assert_eq!(
        parse_decimal("f", Some(" 12.5 ")).unwrap(),
        Some(Decimal::new(125, 1))
    );
    assert!(parse_decimal("f", Some("abc")).is_err());
}

#[test]
fn test_enable_dry_run_lifts_credential_requirement() {
    let yaml = r#"
app:
  name: test
  env: production

exchanges:
  binance:
    enabled: true
    fee_bps: "10"

pairs:
  - BTC/USDT
"#;
    let mut cfg = from_yaml(yaml).unwrap();
    assert!(cfg.validate().is_err());
    assert!(cfg.cycle.is_none());

    cfg.enable_dry_run();

    assert!(cfg.dry_run());
    assert!(cfg.validate().is_ok());
}
