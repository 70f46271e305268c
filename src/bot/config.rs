//! Bot configuration.

use std::time::Duration;

use crate::config::Config;

const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_OVERVIEW_INTERVAL: Duration = Duration::from_secs(3600);

/// Driver loop options.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Application version.
    pub version: String,
    /// Orders are simulated by the paper trading layer.
    pub dry_run: bool,
    /// Opportunities are reported but never executed.
    pub scan_only: bool,
    /// Pause between two cycles.
    pub cycle_interval: Duration,
    /// Number of cycles to run; 0 runs until interrupted.
    pub max_cycles: u64,
    /// Interval between overview notifications.
    pub overview_interval: Duration,
}

impl BotConfig {
    /// Reads loop settings from the `cycle` and `notification` sections.
    pub fn from_config(config: &Config) -> Self {
        let cycle = config.cycle.as_ref();
        let cycle_interval = cycle
            .map(|c| c.cycle_interval)
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_CYCLE_INTERVAL);
        let overview_interval = config
            .notification
            .as_ref()
            .and_then(|n| n.telegram.as_ref())
            .map(|t| t.overview_interval)
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_OVERVIEW_INTERVAL);

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            dry_run: config.dry_run(),
            scan_only: false,
            cycle_interval,
            max_cycles: cycle.and_then(|c| c.max_cycles).unwrap_or(0),
            overview_interval,
        }
    }
}
