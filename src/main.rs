mod accumulator;
mod config;
mod cycle;
mod error;
mod monitor;
mod notifier;
mod power;
mod source;
mod state;
mod threshold;
mod units;

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;
use crate::monitor::QuotaMonitor;
use crate::notifier::{available_channels, create_notifier};
use crate::power::{DryRunPowerControl, PowerControl, SystemPowerControl, has_power_privileges};

/// NetQuota - network traffic quota monitor
#[derive(Parser, Debug)]
#[command(name = "netquota")]
#[command(version)]
#[command(about = "Counts interface traffic per billing cycle, alerts and powers off at the limit", long_about = None)]
struct Args {
    /// Path to the config JSON file (also stores the running statistics)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run a single sampling tick and exit
    #[arg(long)]
    once: bool,

    /// Log instead of powering off when the shutdown limit is reached
    #[arg(long)]
    dry_run: bool,

    /// Print the current cycle summary and exit
    #[arg(long)]
    summary: bool,

    /// List the notification channels compiled in and exit
    #[arg(long)]
    list_channels: bool,
}

fn print_available_channels() {
    println!("NetQuota v{} - Notification Channels\n", env!("CARGO_PKG_VERSION"));

    let channels = available_channels();
    if channels.is_empty() {
        println!("  (none compiled in)");
    }
    for channel in channels {
        println!("  {}", channel);
    }

    println!();
    println!("Select one with \"message.service\" in the config file.");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if args.list_channels {
        print_available_channels();
        return Ok(());
    }

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)?;
    config.apply_defaults();

    if args.summary {
        println!("{}", cycle::cycle_summary(&config.statistics, &config.comparison));
        return Ok(());
    }

    config.validate();

    let notifier = create_notifier(&config);
    match &notifier {
        Ok(n) => log::info!("Notifications via {}", n.channel()),
        Err(e) => log::error!("Notifications disabled: {}", e),
    }

    let power: Box<dyn PowerControl> = if args.dry_run {
        Box::new(DryRunPowerControl)
    } else {
        if !has_power_privileges() {
            log::warn!("Not running as root, powering off at the limit will likely fail");
        }
        Box::new(SystemPowerControl)
    };

    let mut monitor = QuotaMonitor::new(
        config,
        config_path,
        source::default_source()?,
        notifier,
        power,
    );
    monitor.check_interface()?;

    if args.once {
        let report = monitor.tick(Local::now().date_naive()).await;
        if !report.sampled {
            return Err(anyhow::anyhow!("No sample taken, see log for details"));
        }
        if report.cycle_closed {
            println!("Started a new billing cycle");
        }
        for kind in &report.alerts_delivered {
            println!("Delivered {:?} alert", kind);
        }
        if report.powered_off {
            println!("Power-off requested");
        }
        println!("{}", monitor.summary());
        return Ok(());
    }

    monitor.run().await
}
