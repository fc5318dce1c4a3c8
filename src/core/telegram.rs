//! Telegram Bot API client for the edge filter.
//!
//! Alerts are posted as plain text messages to a single chat via the
//! `sendMessage` method.

use async_trait::async_trait;
use log::{error, warn};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::core::notifier::{NotificationChannel, NotifyError};
use crate::models::NotifierConfig;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Telegram API client
pub struct TelegramChannel {
    /// HTTP client
    client: Client,
    /// Bot API base URL
    api_base: String,
    /// Bot token
    bot_token: String,
    /// Target chat
    chat_id: String,
}

impl TelegramChannel {
    /// Create a new Telegram channel
    ///
    /// # Arguments
    ///
    /// * `api_base` - Bot API base URL, normally `https://api.telegram.org`
    /// * `bot_token` - Token issued by BotFather
    /// * `chat_id` - Chat the messages are posted to
    /// * `timeout` - Upper bound for one send
    pub fn new(
        api_base: &str,
        bot_token: String,
        chat_id: String,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }

    /// Build the channel from configuration
    ///
    /// Returns `None` when the bot token or chat id is missing, in which case
    /// alerts are only logged.
    pub fn from_config(config: &NotifierConfig) -> Option<Arc<dyn NotificationChannel>> {
        match (&config.telegram_bot_token, &config.telegram_chat_id) {
            (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
                match Self::new(&config.api_base, token.clone(), chat_id.clone(), config.timeout()) {
                    Ok(channel) => Some(Arc::new(channel) as Arc<dyn NotificationChannel>),
                    Err(e) => {
                        error!("Failed to build Telegram client: {}", e);
                        None
                    }
                }
            }
            _ => {
                warn!("Telegram credentials not configured; attack alerts will only be logged");
                None
            }
        }
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn send_text(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.send_message_url())
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
