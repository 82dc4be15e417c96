// Telegram Bot API notifier

use async_trait::async_trait;
use serde::Serialize;

use super::{Channel, Notifier, check_status};
use crate::error::DeliveryError;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
}

/// Sends `[device] message` to a chat through a bot
pub struct TelegramNotifier {
    http: reqwest::Client,
    endpoint: String,
    chat_id: String,
    device: String,
}

impl TelegramNotifier {
    pub fn new(
        http: reqwest::Client,
        api_base: Option<&str>,
        token: &str,
        chat_id: &str,
        device: &str,
    ) -> Self {
        let base = api_base.unwrap_or(DEFAULT_API_BASE).trim_end_matches('/');

        Self {
            http,
            endpoint: format!("{}/bot{}/sendMessage", base, token),
            chat_id: chat_id.to_string(),
            device: device.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    async fn send(&self, message: &str) -> Result<(), DeliveryError> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: format!("[{}] {}", self.device, message),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|source| DeliveryError::Transport {
                channel: "telegram",
                source,
            })?;

        check_status("telegram", response)?;
        log::debug!("Delivered Telegram message to chat {}", self.chat_id);
        Ok(())
    }
}
