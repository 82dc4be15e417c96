// Persisted billing-cycle state and per-channel alert flags

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Raw cumulative interface counters as read on a single tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSample {
    pub received: u64,
    pub transmitted: u64,
}

impl RawSample {
    pub fn new(received: u64, transmitted: u64) -> Self {
        Self {
            received,
            transmitted,
        }
    }
}

/// Running totals for the current billing cycle.
///
/// Stored under `statistics` in the config record. `cycle_start_date` is
/// `None` when the record has no date yet or the stored one is unparseable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleState {
    #[serde(rename = "total_receive", default)]
    pub total_received: u64,

    #[serde(rename = "total_transmit", default)]
    pub total_transmitted: u64,

    #[serde(rename = "last_receive", default)]
    pub last_received: u64,

    #[serde(rename = "last_transmit", default)]
    pub last_transmitted: u64,

    #[serde(rename = "last_reset", default, with = "date_format")]
    pub cycle_start_date: Option<NaiveDate>,
}

impl CycleState {
    /// True when nothing has been recorded yet (first run)
    pub fn is_fresh(&self) -> bool {
        self.cycle_start_date.is_none() && self.total_received == 0 && self.total_transmitted == 0
    }

    pub fn total(&self) -> u64 {
        self.total_received.saturating_add(self.total_transmitted)
    }
}

/// Position of a channel in the per-cycle alert state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStage {
    /// No alert sent this cycle
    Idle,
    /// Threshold warning delivered
    Warned,
    /// Shutdown warning delivered
    Critical,
}

/// One-shot alert flags for a notification channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFlags {
    #[serde(rename = "threshold_status", default)]
    pub threshold_fired: bool,

    #[serde(rename = "ratio_status", default)]
    pub ratio_fired: bool,
}

impl AlertFlags {
    pub fn stage(&self) -> AlertStage {
        if self.ratio_fired {
            AlertStage::Critical
        } else if self.threshold_fired {
            AlertStage::Warned
        } else {
            AlertStage::Idle
        }
    }
}

/// `YYYY-MM-DD` dates that load as `None` instead of failing on bad input
mod date_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => s.serialize_str(&date.format(FORMAT).to_string()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw = serde_json::Value::deserialize(d)?;
        let date = raw
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), FORMAT).ok());

        if date.is_none() && !raw.is_null() && raw.as_str() != Some("") {
            log::warn!("Ignoring unparseable last_reset value: {}", raw);
        }

        Ok(date)
    }
}
