//! Bounded retry policy with fixed or exponential backoff.

use std::time::Duration;

use crate::config::RetryConfig;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Delay between two attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

/// RetryPolicy bounds how many times a leg is retried and how long to wait
/// before each retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Retries without waiting.
    #[cfg(test)]
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Backoff::Fixed(Duration::ZERO))
    }

    /// Builds the policy from the `execution.retry` section. Unset or zero
    /// values fall back to defaults; a multiplier of 1.0 means fixed delays.
    pub fn from_config(config: Option<&RetryConfig>) -> Self {
        let Some(config) = config else {
            return Self::new(
                DEFAULT_MAX_RETRIES,
                Backoff::Exponential {
                    initial: DEFAULT_INITIAL_DELAY,
                    max: DEFAULT_MAX_DELAY,
                    multiplier: DEFAULT_MULTIPLIER,
                },
            );
        };

        let max_retries = config
            .max_retries
            .and_then(|r| u32::try_from(r).ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);
        let initial = non_zero_or(config.initial_delay, DEFAULT_INITIAL_DELAY);
        let max = non_zero_or(config.max_delay, DEFAULT_MAX_DELAY).max(initial);
        let multiplier = config.multiplier.unwrap_or(DEFAULT_MULTIPLIER);

        let backoff = if multiplier <= 1.0 {
            Backoff::Fixed(initial)
        } else {
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            }
        };

        Self::new(max_retries, backoff)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts allowed, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Delay before retry number `retry` (1 for the first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
                let secs = initial.as_secs_f64() * multiplier.powi(exponent);
                Duration::try_from_secs_f64(secs)
                    .map(|d| d.min(max))
                    .unwrap_or(max)
            }
        }
    }

    /// Sleeps before retry number `retry`.
    pub async fn wait(&self, retry: u32) {
        let delay = self.delay(retry);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn non_zero_or(value: Duration, default: Duration) -> Duration {
    if value.is_zero() { default } else { value }
}
