// Configuration record: settings plus the persisted cycle state and alert flags

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;
use crate::notifier::Channel;
use crate::state::{AlertFlags, CycleState};
use crate::threshold::Category;

const CONFIG_DIR: &str = "netquota";
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_INTERFACE: &str = "eth0";
pub const DEFAULT_INTERVAL_SECS: u64 = 600;

/// Usage category and limits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comparison {
    /// One of `download`, `upload`, `upload+download`, `anymax`
    #[serde(default)]
    pub category: String,

    /// Limit in GB
    #[serde(default)]
    pub limit: f64,

    /// Fraction of the limit that triggers the warning
    #[serde(default)]
    pub threshold: f64,

    /// Fraction of the limit that triggers shutdown
    #[serde(default)]
    pub ratio: f64,
}

impl Comparison {
    pub fn category(&self) -> Result<Category, ConfigError> {
        Category::from_str(&self.category)
    }
}

/// Telegram bot credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(flatten)]
    pub alerts: AlertFlags,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub chat_id: String,

    /// Override for the Bot API endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

/// Gotify server credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GotifyConfig {
    #[serde(flatten)]
    pub alerts: AlertFlags,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub app_token: String,
}

/// Notification channel selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageConfig {
    /// Active channel: `telegram` or `gotify`
    #[serde(default)]
    pub service: String,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub gotify: GotifyConfig,
}

impl MessageConfig {
    pub fn channel(&self) -> Result<Channel, ConfigError> {
        Channel::from_str(&self.service)
    }
}

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Label shown in notifications
    #[serde(default)]
    pub device: String,

    /// Interface to account
    #[serde(default)]
    pub interface: String,

    /// Sampling interval in seconds
    #[serde(default)]
    pub interval: u64,

    /// Day of month the billing cycle starts
    #[serde(default)]
    pub start_day: u32,

    #[serde(default)]
    pub statistics: CycleState,

    #[serde(default)]
    pub comparison: Comparison,

    #[serde(default)]
    pub message: MessageConfig,
}

impl Config {
    /// Default config file path (`~/.config/netquota/config.json` on Linux)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }

    /// Load configuration from disk, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::warn!("Config file {:?} not found, using defaults", path);
            return Ok(Config::default());
        }

        let contents =
            fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;

        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .context(format!("Failed to create config directory: {:?}", dir))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents).context(format!("Failed to write config file: {:?}", path))?;

        log::debug!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Fill in the interface and interval when left empty
    pub fn apply_defaults(&mut self) {
        if self.interface.is_empty() {
            log::info!("No interface configured, defaulting to {}", DEFAULT_INTERFACE);
            self.interface = DEFAULT_INTERFACE.to_string();
        }
        if self.interval == 0 {
            self.interval = DEFAULT_INTERVAL_SECS;
        }
    }

    /// Log warnings for values that are accepted but probably wrong
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let cmp = &self.comparison;

        if let Err(e) = cmp.category() {
            warnings.push(e.to_string());
        }
        if let Err(e) = self.message.channel() {
            warnings.push(e.to_string());
        }
        if cmp.limit <= 0.0 {
            warnings.push(format!("limit should be positive, got {}", cmp.limit));
        }
        if !(0.0..=1.0).contains(&cmp.threshold) {
            warnings.push(format!("threshold should be within 0-1, got {}", cmp.threshold));
        }
        if !(0.0..=1.0).contains(&cmp.ratio) {
            warnings.push(format!("ratio should be within 0-1, got {}", cmp.ratio));
        }
        if cmp.ratio < cmp.threshold {
            warnings.push(format!(
                "ratio ({}) is below threshold ({}), shutdown warning may precede the usage warning",
                cmp.ratio, cmp.threshold
            ));
        }
        if !(1..=31).contains(&self.start_day) {
            warnings.push(format!(
                "start_day should be within 1-31, got {} (clamped)",
                self.start_day
            ));
        }

        for warning in &warnings {
            log::warn!("Config: {}", warning);
        }
        warnings
    }

    /// Alert flags of the given channel
    pub fn alert_flags(&self, channel: Channel) -> AlertFlags {
        match channel {
            Channel::Telegram => self.message.telegram.alerts,
            Channel::Gotify => self.message.gotify.alerts,
        }
    }

    pub fn set_alert_flags(&mut self, channel: Channel, flags: AlertFlags) {
        match channel {
            Channel::Telegram => self.message.telegram.alerts = flags,
            Channel::Gotify => self.message.gotify.alerts = flags,
        }
    }

    /// Clear the alert flags of every channel
    pub fn clear_alert_flags(&mut self) {
        self.message.telegram.alerts = AlertFlags::default();
        self.message.gotify.alerts = AlertFlags::default();
    }
}
