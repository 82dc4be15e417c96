// Interface byte counter sources

use crate::error::SourceError;
use crate::state::RawSample;

/// Reads cumulative receive/transmit counters for a named interface
pub trait CounterSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &'static str;

    /// Counters since the interface (or host) last came up
    fn read_counters(&self, interface: &str) -> Result<RawSample, SourceError>;
}

/// Counters from `/proc/net/dev`
#[cfg(target_os = "linux")]
pub struct ProcNetDev;

#[cfg(target_os = "linux")]
impl CounterSource for ProcNetDev {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn read_counters(&self, interface: &str) -> Result<RawSample, SourceError> {
        let devices = procfs::net::dev_status().map_err(|e| SourceError::Unreadable {
            interface: interface.to_string(),
            reason: e.to_string(),
        })?;

        let status = devices
            .get(interface)
            .ok_or_else(|| SourceError::NotFound(interface.to_string()))?;

        Ok(RawSample::new(status.recv_bytes, status.sent_bytes))
    }
}

/// Counter source for the current platform
pub fn default_source() -> anyhow::Result<Box<dyn CounterSource>> {
    #[cfg(target_os = "linux")]
    return Ok(Box::new(ProcNetDev));

    #[cfg(not(target_os = "linux"))]
    Err(anyhow::anyhow!(
        "No interface counter source available on this platform"
    ))
}
