//! Operator notifications for trades, failures and periodic overviews.

mod notifier;
mod telegram;

pub use notifier::{
    ErrorData, Event, EventData, EventType, ExecutionData, MultiNotifier, NoopNotifier,
    NotificationError, Notifier, OverviewData, ShutdownData, StartupData, format_event,
};
pub use telegram::TelegramNotifier;
