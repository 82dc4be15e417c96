// Error types for the accounting core and its collaborators

use thiserror::Error;

/// Configuration problems detected while evaluating a tick
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid comparison category: {0}")]
    UnknownCategory(String),

    #[error("unknown message service: {0}")]
    UnknownChannel(String),

    #[error("message service {0} is not compiled in")]
    ChannelDisabled(&'static str),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("message service {channel} is missing `{field}`")]
    MissingCredential {
        channel: &'static str,
        field: &'static str,
    },
}

/// Counter source failures
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("interface {0} not found")]
    NotFound(String),

    #[error("failed to read counters for {interface}: {reason}")]
    Unreadable { interface: String, reason: String },
}

/// Notification delivery failures
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to send message to {channel}: {source}")]
    Transport {
        channel: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("got error status from {channel}: {status}")]
    Status {
        channel: &'static str,
        status: reqwest::StatusCode,
    },
}
