// Threshold evaluation: usage per category against the warning and shutdown limits

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::Comparison;
use crate::error::ConfigError;
use crate::state::{AlertFlags, CycleState};
use crate::units::bytes_to_gb;

/// Delay between a delivered shutdown warning and powering off
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Which traffic counts towards the limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Received bytes only
    Download,
    /// Transmitted bytes only
    Upload,
    /// Received plus transmitted
    UploadDownload,
    /// Larger of the two directions
    AnyMax,
}

impl Category {
    /// Usage in GB for this category
    pub fn usage_gb(&self, state: &CycleState) -> f64 {
        let received = bytes_to_gb(state.total_received);
        let transmitted = bytes_to_gb(state.total_transmitted);

        match self {
            Category::Download => received,
            Category::Upload => transmitted,
            Category::UploadDownload => received + transmitted,
            Category::AnyMax => received.max(transmitted),
        }
    }

    pub fn usage_label(&self) -> &'static str {
        match self {
            Category::Download => "Download traffic",
            Category::Upload => "Upload traffic",
            Category::UploadDownload => "Total traffic",
            Category::AnyMax => "Max one-way traffic",
        }
    }
}

impl FromStr for Category {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "download" => Ok(Category::Download),
            "upload" => Ok(Category::Upload),
            "upload+download" => Ok(Category::UploadDownload),
            "anymax" => Ok(Category::AnyMax),
            other => Err(ConfigError::UnknownCategory(other.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Download => "download",
            Category::Upload => "upload",
            Category::UploadDownload => "upload+download",
            Category::AnyMax => "anymax",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Soft limit warning
    Threshold,
    /// Hard limit, followed by power-off
    Ratio,
}

/// A notification the evaluator wants delivered
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: AlertKind,
    pub usage_gb: f64,
    pub message: String,
}

/// Follow-up work for the driver loop after a delivered alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ScheduleShutdown { after: Duration },
}

/// Decide which one-shot alerts are due for the current totals
pub fn evaluate(
    state: &CycleState,
    comparison: &Comparison,
    flags: AlertFlags,
) -> Result<Vec<Alert>, ConfigError> {
    let category = comparison.category()?;
    let usage_gb = category.usage_gb(state);

    let threshold_limit = comparison.limit * comparison.threshold;
    let ratio_limit = comparison.limit * comparison.ratio;

    log::debug!(
        "Usage {:.2} GB ({}), threshold at {:.2} GB, shutdown at {:.2} GB, stage {:?}",
        usage_gb,
        category,
        threshold_limit,
        ratio_limit,
        flags.stage()
    );

    let mut alerts = Vec::new();

    if usage_gb >= threshold_limit && !flags.threshold_fired {
        alerts.push(Alert {
            kind: AlertKind::Threshold,
            usage_gb,
            message: format!(
                "Traffic warning: current usage is {:.2} GB, over the {:.0}% threshold",
                usage_gb,
                comparison.threshold * 100.0
            ),
        });
    }

    if usage_gb >= ratio_limit && !flags.ratio_fired {
        alerts.push(Alert {
            kind: AlertKind::Ratio,
            usage_gb,
            message: format!(
                "Shutdown warning: current usage is {:.2} GB, over {:.0}% of the limit, shutting down!",
                usage_gb,
                comparison.ratio * 100.0
            ),
        });
    }

    Ok(alerts)
}

/// Update the flags after a delivery attempt.
///
/// Failed deliveries leave the flags untouched so the alert is retried on
/// the next tick.
pub fn record_delivery(
    flags: AlertFlags,
    alert: &Alert,
    delivered: bool,
) -> (AlertFlags, Option<Action>) {
    if !delivered {
        return (flags, None);
    }

    match alert.kind {
        AlertKind::Threshold => (
            AlertFlags {
                threshold_fired: true,
                ..flags
            },
            None,
        ),
        AlertKind::Ratio => (
            AlertFlags {
                ratio_fired: true,
                ..flags
            },
            Some(Action::ScheduleShutdown {
                after: SHUTDOWN_GRACE,
            }),
        ),
    }
}
