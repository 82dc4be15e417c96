// Gotify push notifier

use async_trait::async_trait;
use serde::Serialize;

use super::{Channel, Notifier, check_status};
use crate::error::DeliveryError;

const PRIORITY: u8 = 5;

#[derive(Serialize)]
struct GotifyMessage<'a> {
    title: String,
    message: &'a str,
    priority: u8,
}

/// Posts messages to a Gotify server's `/message` endpoint
pub struct GotifyNotifier {
    http: reqwest::Client,
    endpoint: String,
    app_token: String,
    device: String,
}

impl GotifyNotifier {
    pub fn new(http: reqwest::Client, url: &str, app_token: &str, device: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/message", url.trim_end_matches('/')),
            app_token: app_token.to_string(),
            device: device.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for GotifyNotifier {
    fn channel(&self) -> Channel {
        Channel::Gotify
    }

    async fn send(&self, message: &str) -> Result<(), DeliveryError> {
        let body = GotifyMessage {
            title: format!("Network Monitor: {}", self.device),
            message,
            priority: PRIORITY,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Gotify-Key", &self.app_token)
            .json(&body)
            .send()
            .await
            .map_err(|source| DeliveryError::Transport {
                channel: "gotify",
                source,
            })?;

        check_status("gotify", response)
    }
}
