//! Execution configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Order execution settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Upper bound for every exchange call of a leg, and for waiting on its fill.
    #[serde(default, with = "duration")]
    pub leg_timeout: Duration,
    /// Interval between order status polls while waiting for a fill.
    #[serde(default, with = "duration")]
    pub fill_poll_interval: Duration,
    /// Retry behavior for failed legs.
    pub retry: Option<RetryConfig>,
}

/// Retry settings for failed legs.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: Option<i32>,
    /// Delay before the first retry.
    #[serde(default, with = "duration")]
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    #[serde(default, with = "duration")]
    pub max_delay: Duration,
    /// Factor by which delay increases after each retry; 1.0 or absent means fixed.
    pub multiplier: Option<f64>,
}
