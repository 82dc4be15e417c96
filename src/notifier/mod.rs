// Notification channel trait and implementations

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;
use crate::error::{ConfigError, DeliveryError};

#[cfg(feature = "notify-gotify")]
pub mod gotify;
#[cfg(feature = "notify-telegram")]
pub mod telegram;

/// Notification channel selected by `message.service`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Telegram,
    Gotify,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Telegram => "telegram",
            Channel::Gotify => "gotify",
        }
    }
}

impl FromStr for Channel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(Channel::Telegram),
            "gotify" => Ok(Channel::Gotify),
            other => Err(ConfigError::UnknownChannel(other.to_string())),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Delivers plain-text messages through one channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel this notifier delivers through
    fn channel(&self) -> Channel;

    /// Send a message; either the whole message is accepted or an error is returned
    async fn send(&self, message: &str) -> Result<(), DeliveryError>;
}

/// Upper bound for a single notification request
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client shared by the channels; requests fail after `timeout`
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("netquota/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Channels compiled into this build
pub fn available_channels() -> Vec<Channel> {
    let mut channels = Vec::new();

    #[cfg(feature = "notify-telegram")]
    channels.push(Channel::Telegram);

    #[cfg(feature = "notify-gotify")]
    channels.push(Channel::Gotify);

    channels
}

/// Create the notifier for the configured channel
pub fn create_notifier(config: &Config) -> Result<Box<dyn Notifier>, ConfigError> {
    let channel = config.message.channel()?;
    let http = build_http_client(HTTP_TIMEOUT)?;

    match channel {
        #[cfg(feature = "notify-telegram")]
        Channel::Telegram => {
            let tg = &config.message.telegram;
            if tg.token.is_empty() {
                return Err(ConfigError::MissingCredential {
                    channel: "telegram",
                    field: "token",
                });
            }
            if tg.chat_id.is_empty() {
                return Err(ConfigError::MissingCredential {
                    channel: "telegram",
                    field: "chat_id",
                });
            }
            Ok(Box::new(telegram::TelegramNotifier::new(
                http,
                tg.api_base.as_deref(),
                &tg.token,
                &tg.chat_id,
                &config.device,
            )))
        }

        #[cfg(feature = "notify-gotify")]
        Channel::Gotify => {
            let gotify = &config.message.gotify;
            if gotify.url.is_empty() {
                return Err(ConfigError::MissingCredential {
                    channel: "gotify",
                    field: "url",
                });
            }
            if gotify.app_token.is_empty() {
                return Err(ConfigError::MissingCredential {
                    channel: "gotify",
                    field: "app_token",
                });
            }
            Ok(Box::new(gotify::GotifyNotifier::new(
                http,
                &gotify.url,
                &gotify.app_token,
                &config.device,
            )))
        }

        #[allow(unreachable_patterns)]
        other => Err(ConfigError::ChannelDisabled(other.name())),
    }
}

/// Map a response status to a delivery result
pub(crate) fn check_status(
    channel: &'static str,
    response: reqwest::Response,
) -> Result<(), DeliveryError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(DeliveryError::Status { channel, status })
    }
}
