//! Bot error types.

use crate::config::ConfigError;
use crate::exchanges::ExchangeError;
use crate::notification::NotificationError;
use crate::storage::StorageError;

/// Bot error type.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("notification error: {0}")]
    Notification(#[from] NotificationError),
    #[error("failed to write cycle result: {0}")]
    Output(#[from] std::io::Error),
    #[error("failed to encode cycle result: {0}")]
    Encode(#[from] serde_json::Error),
}
