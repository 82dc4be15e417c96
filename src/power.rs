// Host power control

use anyhow::{Context, Result, anyhow};
use std::io::ErrorKind;
use std::process::Command;

/// Powers off the host
pub trait PowerControl: Send + Sync {
    fn name(&self) -> &'static str;

    fn power_off(&self) -> Result<()>;
}

/// `shutdown -h now`, or `poweroff` where `shutdown` is not installed
pub struct SystemPowerControl;

impl SystemPowerControl {
    fn run(program: &str, args: &[&str]) -> std::io::Result<std::process::ExitStatus> {
        log::info!("Running {} {}", program, args.join(" "));
        Command::new(program).args(args).status()
    }
}

impl PowerControl for SystemPowerControl {
    fn name(&self) -> &'static str {
        "system"
    }

    fn power_off(&self) -> Result<()> {
        let status = match Self::run("shutdown", &["-h", "now"]) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("shutdown not found, falling back to poweroff");
                Self::run("poweroff", &[]).context("Failed to execute poweroff")?
            }
            other => other.context("Failed to execute shutdown")?,
        };

        if !status.success() {
            return Err(anyhow!("Shutdown command exited with {}", status));
        }
        Ok(())
    }
}

/// Logs instead of powering off (`--dry-run`)
pub struct DryRunPowerControl;

impl PowerControl for DryRunPowerControl {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn power_off(&self) -> Result<()> {
        log::warn!("Dry run: host would be powered off now");
        Ok(())
    }
}

/// Whether the process may power off the host
pub fn has_power_privileges() -> bool {
    #[cfg(target_os = "linux")]
    return nix::unistd::geteuid().is_root();

    #[cfg(not(target_os = "linux"))]
    true
}
