use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::TelegramConfig;
use crate::notification::{Event, EventType, NotificationError, Notifier, format_event};

const TELEGRAM_API_URL: &str = "https://api.telegram.org/bot";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_MESSAGE_LENGTH: usize = 4096;
const DEFAULT_QUEUE_SIZE: usize = 100;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct Target {
    chat_id: String,
    error_chat_id: Option<String>,
}

impl Target {
    fn chat_for(&self, event_type: EventType) -> &str {
        match (event_type, &self.error_chat_id) {
            (EventType::Error, Some(chat_id)) => chat_id,
            _ => &self.chat_id,
        }
    }
}

/// Sends notifications through the Telegram Bot API.
///
/// `send_async` queues events for a background worker; `close` drains the
/// queue before returning.
pub struct TelegramNotifier {
    config: TelegramConfig,
    target: Target,
    http_client: reqwest::Client,
    api_url: String,
    sender: StdMutex<Option<mpsc::Sender<Event>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramNotifier {
    /// Creates the notifier and spawns its queue worker. Must be called
    /// inside a tokio runtime.
    pub fn new(config: &TelegramConfig) -> Result<Self, NotificationError> {
        if config.bot_token.is_empty() {
            return Err(NotificationError::Config("bot_token is required".to_string()));
        }
        if config.chat_id.is_empty() {
            return Err(NotificationError::Config("chat_id is required".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()?;

        let api_url = format!("{}{}", TELEGRAM_API_URL, config.bot_token);
        let target = Target {
            chat_id: config.chat_id.clone(),
            error_chat_id: Some(config.error_chat_id.clone()).filter(|id| !id.is_empty()),
        };

        let queue_size = config
            .queue_size
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_QUEUE_SIZE);
        let (sender, receiver) = mpsc::channel(queue_size);
        let worker = Self::spawn_worker(receiver, target.clone(), http_client.clone(), api_url.clone());

        Ok(Self {
            config: config.clone(),
            target,
            http_client,
            api_url,
            sender: StdMutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    fn spawn_worker(
        mut receiver: mpsc::Receiver<Event>,
        target: Target,
        http_client: reqwest::Client,
        api_url: String,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let chat_id = target.chat_for(event.event_type);
                let text = format_event(&event);
                if let Err(e) = send_message(&http_client, &api_url, chat_id, &text).await {
                    error!(
                        event_type = %event.event_type,
                        queued_at = %event.timestamp,
                        error = %e,
                        "failed to send Telegram message"
                    );
                }
            }
            debug!("Telegram worker stopped");
        })
    }
}

/// Cuts a message to the Telegram limit without splitting a character.
fn truncate_message(text: &str) -> &str {
    if text.len() <= MAX_MESSAGE_LENGTH {
        return text;
    }
    let mut end = MAX_MESSAGE_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

async fn send_message(
    http_client: &reqwest::Client,
    api_url: &str,
    chat_id: &str,
    text: &str,
) -> Result<(), NotificationError> {
    let url = format!("{}/sendMessage", api_url);

    let payload = serde_json::json!({
        "chat_id": chat_id,
        "text": truncate_message(text),
        "parse_mode": "Markdown"
    });

    let response = http_client.post(&url).json(&payload).send().await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(NotificationError::Api { status, body });
    }

    Ok(())
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        if !self.is_enabled(event.event_type) {
            return Ok(());
        }

        let text = format_event(event);
        send_message(
            &self.http_client,
            &self.api_url,
            self.target.chat_for(event.event_type),
            &text,
        )
        .await
    }

    fn send_async(&self, event: Event) {
        if !self.is_enabled(event.event_type) {
            return;
        }

        let Ok(guard) = self.sender.lock() else {
            return;
        };
        match guard.as_ref() {
            Some(sender) => {
                if let Err(e) = sender.try_send(event) {
                    error!(error = %e, "failed to queue Telegram message");
                }
            }
            None => debug!("Telegram notifier closed, event dropped"),
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        match event_type {
            EventType::Startup | EventType::Shutdown => true,
            EventType::Execution => self.config.notify_executions,
            EventType::Error => self.config.notify_errors,
            EventType::Overview => self.config.notify_overview,
        }
    }

    async fn close(&self) -> Result<(), NotificationError> {
        // Dropping the sender ends the worker once the queue is drained.
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if tokio::time::timeout(CLOSE_TIMEOUT, worker).await.is_err() {
                warn!("Telegram worker did not drain in time");
            }
        }
        Ok(())
    }
}
