//! Cycle scheduling configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Cycle bounds and driver loop settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CycleConfig {
    /// Maximum trades started per cycle.
    pub max_trades_per_cycle: Option<i32>,
    /// Wall-clock budget after which no new trade is started (default: 30s).
    #[serde(default, with = "duration")]
    pub cycle_deadline: Duration,
    /// Pause between cycles in the driver loop (default: 1s).
    #[serde(default, with = "duration")]
    pub cycle_interval: Duration,
    /// Number of cycles to run; 0 runs until interrupted.
    pub max_cycles: Option<u64>,
    /// Simulate orders instead of sending them.
    #[serde(default)]
    pub dry_run: bool,
}
