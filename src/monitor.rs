// Driver loop: sample, accumulate, persist, evaluate, alert

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::mem;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio::time::{MissedTickBehavior, interval};

use crate::accumulator::accumulate;
use crate::config::Config;
use crate::cycle;
use crate::error::ConfigError;
use crate::notifier::Notifier;
use crate::power::PowerControl;
use crate::source::CounterSource;
use crate::threshold::{self, Action, AlertKind};
use crate::units::human_readable;

/// What a single tick did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub cycle_closed: bool,
    pub sampled: bool,
    pub alerts_delivered: Vec<AlertKind>,
    pub powered_off: bool,
}

/// Owns the config record and drives one interface's accounting
pub struct QuotaMonitor {
    config: Config,
    config_path: PathBuf,
    source: Box<dyn CounterSource>,
    notifier: Result<Box<dyn Notifier>, ConfigError>,
    power: Box<dyn PowerControl>,
}

impl QuotaMonitor {
    pub fn new(
        config: Config,
        config_path: PathBuf,
        source: Box<dyn CounterSource>,
        notifier: Result<Box<dyn Notifier>, ConfigError>,
        power: Box<dyn PowerControl>,
    ) -> Self {
        Self {
            config,
            config_path,
            source,
            notifier,
            power,
        }
    }

    /// Fail early when the configured interface does not exist
    pub fn check_interface(&self) -> Result<()> {
        let sample = self
            .source
            .read_counters(&self.config.interface)
            .context("Error checking interface existence")?;

        log::info!(
            "Monitoring {} via {} (rx {}, tx {} since boot)",
            self.config.interface,
            self.source.name(),
            human_readable(sample.received),
            human_readable(sample.transmitted)
        );
        Ok(())
    }

    /// Report for the cycle in progress
    pub fn summary(&self) -> String {
        cycle::cycle_summary(&self.config.statistics, &self.config.comparison)
    }

    /// Tick every `interval` seconds until Ctrl+C
    pub async fn run(&mut self) -> Result<()> {
        let mut ticker = interval(Duration::from_secs(self.config.interval));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "Sampling {} every {}s, cycle starts on day {}",
            self.config.interface,
            self.config.interval,
            self.config.start_day
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Local::now().date_naive()).await;
                }
                _ = signal::ctrl_c() => {
                    log::info!("Received Ctrl+C, stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Run one sampling tick for `today`.
    ///
    /// The cycle is closed before the sample is accumulated so the new
    /// delta is credited to the new cycle.
    pub async fn tick(&mut self, today: NaiveDate) -> TickReport {
        let mut report = TickReport::default();

        if cycle::should_reset(
            today,
            self.config.statistics.cycle_start_date,
            self.config.start_day,
        ) {
            self.close_cycle(today).await;
            report.cycle_closed = true;
        }

        let sample = match self.source.read_counters(&self.config.interface) {
            Ok(sample) => sample,
            Err(e) => {
                log::warn!("Error reading network stats: {}", e);
                return report;
            }
        };
        log::debug!(
            "Sampled {}: rx={} tx={}",
            self.config.interface,
            sample.received,
            sample.transmitted
        );

        let stats = &self.config.statistics;
        if sample.received < stats.last_received || sample.transmitted < stats.last_transmitted {
            log::info!(
                "Counter reset detected (rx {} -> {}, tx {} -> {})",
                stats.last_received,
                sample.received,
                stats.last_transmitted,
                sample.transmitted
            );
        }

        let state = mem::take(&mut self.config.statistics);
        self.config.statistics = accumulate(state, sample);
        report.sampled = true;
        self.persist("updating statistics");

        log::info!(
            "Cycle totals: received {}, transmitted {}, combined {}",
            human_readable(self.config.statistics.total_received),
            human_readable(self.config.statistics.total_transmitted),
            human_readable(self.config.statistics.total())
        );

        for action in self.check_thresholds(&mut report).await {
            match action {
                Action::ScheduleShutdown { after } => {
                    report.powered_off = self.shutdown_after(after).await;
                }
            }
        }

        report
    }

    async fn close_cycle(&mut self, today: NaiveDate) {
        let state = mem::take(&mut self.config.statistics);
        let first_run = state.is_fresh();
        let (summary, next) = cycle::close_cycle(state, &self.config.comparison, today);

        if first_run {
            log::info!("Starting first accounting cycle on {}", today);
        } else {
            log::info!("Billing cycle rolled over on {}", today);
            match &self.notifier {
                Ok(notifier) => {
                    if let Err(e) = notifier.send(&summary).await {
                        log::warn!("Failed to send statistics summary: {}", e);
                    }
                }
                Err(e) => log::warn!("Cannot send statistics summary: {}", e),
            }
        }

        self.config.statistics = next;
        self.config.clear_alert_flags();
        self.persist("cycle reset");
    }

    /// Deliver due alerts and record the ones that went through
    async fn check_thresholds(&mut self, report: &mut TickReport) -> Vec<Action> {
        let notifier = match &self.notifier {
            Ok(notifier) => notifier,
            Err(e) => {
                log::error!("Comparison error: {}", e);
                return Vec::new();
            }
        };
        let channel = notifier.channel();
        let initial = self.config.alert_flags(channel);

        let alerts = match threshold::evaluate(
            &self.config.statistics,
            &self.config.comparison,
            initial,
        ) {
            Ok(alerts) => alerts,
            Err(e) => {
                log::error!("Comparison error: {}", e);
                return Vec::new();
            }
        };

        let mut flags = initial;
        let mut actions = Vec::new();

        for alert in &alerts {
            let delivered = match notifier.send(&alert.message).await {
                Ok(()) => {
                    log::info!(
                        "Sent {:?} alert via {} at {:.2} GB",
                        alert.kind,
                        channel,
                        alert.usage_gb
                    );
                    report.alerts_delivered.push(alert.kind);
                    true
                }
                Err(e) => {
                    log::warn!("Failed to send {:?} alert: {}", alert.kind, e);
                    false
                }
            };

            let (next, action) = threshold::record_delivery(flags, alert, delivered);
            if next != flags {
                flags = next;
                self.config.set_alert_flags(channel, flags);
                self.persist("alert delivery");
            }
            actions.extend(action);
        }

        actions
    }

    async fn shutdown_after(&self, after: Duration) -> bool {
        log::warn!(
            "Usage limit reached, powering off in {}s ({})",
            after.as_secs(),
            self.power.name()
        );
        tokio::time::sleep(after).await;

        match self.power.power_off() {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to execute shutdown command: {:#}", e);
                false
            }
        }
    }

    fn persist(&self, what: &str) {
        if let Err(e) = self.config.save(&self.config_path) {
            log::warn!("Failed to save config after {}: {:#}", what, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeliveryError, SourceError};
    use crate::notifier::Channel;
    use crate::state::{AlertFlags, CycleState, RawSample};
    use crate::threshold::SHUTDOWN_GRACE;
    use crate::units::BYTES_PER_GB;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn gb(value: f64) -> u64 {
        (value * BYTES_PER_GB) as u64
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[derive(Clone, Default)]
    struct FakeSource {
        sample: Arc<Mutex<Option<RawSample>>>,
    }

    impl FakeSource {
        fn set(&self, received: u64, transmitted: u64) {
            *self.sample.lock().unwrap() = Some(RawSample::new(received, transmitted));
        }

        fn unplug(&self) {
            *self.sample.lock().unwrap() = None;
        }
    }

    impl CounterSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn read_counters(&self, interface: &str) -> Result<RawSample, SourceError> {
            let sample = *self.sample.lock().unwrap();
            sample.ok_or_else(|| SourceError::NotFound(interface.to_string()))
        }
    }

    #[derive(Clone, Default)]
    struct FakeNotifier {
        sent: Arc<Mutex<Vec<String>>>,
        failing: Arc<AtomicBool>,
    }

    impl FakeNotifier {
        fn messages(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        fn channel(&self) -> Channel {
            Channel::Gotify
        }

        async fn send(&self, message: &str) -> Result<(), DeliveryError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(DeliveryError::Status {
                    channel: "gotify",
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                });
            }
            self.sent.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakePower {
        calls: Arc<AtomicUsize>,
    }

    impl PowerControl for FakePower {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn power_off(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        monitor: QuotaMonitor,
        source: FakeSource,
        notifier: FakeNotifier,
        power: FakePower,
        path: PathBuf,
        _dir: tempfile::TempDir,
    }

    fn base_config() -> Config {
        let mut config = Config::default();
        config.device = "test-box".to_string();
        config.interface = "eth0".to_string();
        config.interval = 60;
        config.start_day = 1;
        config.statistics.cycle_start_date = Some(date(2024, 3, 1));
        config.comparison.category = "upload+download".to_string();
        config.comparison.limit = 100.0;
        config.comparison.threshold = 0.8;
        config.comparison.ratio = 0.95;
        config.message.service = "gotify".to_string();
        config
    }

    fn harness(config: Config) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let source = FakeSource::default();
        let notifier = FakeNotifier::default();
        let power = FakePower::default();

        let monitor = QuotaMonitor::new(
            config,
            path.clone(),
            Box::new(source.clone()),
            Ok(Box::new(notifier.clone())),
            Box::new(power.clone()),
        );

        Harness {
            monitor,
            source,
            notifier,
            power,
            path,
            _dir: dir,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_scenario() {
        let mut h = harness(base_config());
        let today = date(2024, 3, 10);

        h.source.set(gb(60.5), gb(20.0));
        let report = h.monitor.tick(today).await;
        assert!(report.sampled);
        assert!(!report.cycle_closed);
        assert_eq!(report.alerts_delivered, vec![AlertKind::Threshold]);
        assert!(!report.powered_off);

        let saved = Config::load(&h.path).unwrap();
        assert!(saved.alert_flags(Channel::Gotify).threshold_fired);
        assert_eq!(saved.statistics.total(), gb(80.5));

        h.source.set(gb(70.2), gb(25.0));
        let before = tokio::time::Instant::now();
        let report = h.monitor.tick(today).await;
        assert_eq!(report.alerts_delivered, vec![AlertKind::Ratio]);
        assert!(report.powered_off);
        assert!(before.elapsed() >= SHUTDOWN_GRACE);
        assert_eq!(h.power.calls.load(Ordering::SeqCst), 1);

        h.source.set(gb(71.0), gb(25.0));
        let report = h.monitor.tick(today).await;
        assert!(report.alerts_delivered.is_empty());
        assert!(!report.powered_off);

        assert_eq!(h.notifier.messages().len(), 2);
        assert_eq!(h.power.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            Config::load(&h.path).unwrap().alert_flags(Channel::Gotify),
            AlertFlags {
                threshold_fired: true,
                ratio_fired: true,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delivery_retries_next_tick() {
        let mut config = base_config();
        config.message.gotify.alerts.threshold_fired = true;
        let mut h = harness(config);
        let today = date(2024, 3, 10);

        h.notifier.set_failing(true);
        h.source.set(gb(96.0), 0);
        let report = h.monitor.tick(today).await;
        assert!(report.alerts_delivered.is_empty());
        assert!(!report.powered_off);
        assert!(!h.monitor.config.alert_flags(Channel::Gotify).ratio_fired);
        assert_eq!(h.power.calls.load(Ordering::SeqCst), 0);

        h.notifier.set_failing(false);
        h.source.set(gb(96.0), 0);
        let report = h.monitor.tick(today).await;
        assert_eq!(report.alerts_delivered, vec![AlertKind::Ratio]);
        assert!(report.powered_off);
        assert!(h.monitor.config.alert_flags(Channel::Gotify).ratio_fired);
    }

    #[tokio::test]
    async fn test_cycle_rollover_before_accumulation() {
        let mut config = base_config();
        config.start_day = 5;
        config.statistics = CycleState {
            total_received: gb(40.0),
            total_transmitted: gb(10.0),
            last_received: 1_000,
            last_transmitted: 2_000,
            cycle_start_date: Some(date(2024, 1, 5)),
        };
        config.message.gotify.alerts.threshold_fired = true;
        config.message.telegram.alerts.ratio_fired = true;
        let mut h = harness(config);

        h.source.set(1_500, 2_100);
        let report = h.monitor.tick(date(2024, 2, 5)).await;
        assert!(report.cycle_closed);

        let messages = h.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Cycle summary (2024-01-05 to date)"));
        assert!(messages[0].contains("Total: 50.00 GB"));

        let stats = &h.monitor.config.statistics;
        assert_eq!(stats.total_received, 500);
        assert_eq!(stats.total_transmitted, 100);
        assert_eq!(stats.cycle_start_date, Some(date(2024, 2, 5)));
        assert_eq!(
            h.monitor.config.alert_flags(Channel::Gotify),
            AlertFlags::default()
        );
        assert_eq!(
            h.monitor.config.alert_flags(Channel::Telegram),
            AlertFlags::default()
        );

        // Same day again: no second close
        let report = h.monitor.tick(date(2024, 2, 5)).await;
        assert!(!report.cycle_closed);
        assert_eq!(h.notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_summary_failure_does_not_block_reset() {
        let mut config = base_config();
        config.statistics.total_received = gb(1.0);
        config.statistics.cycle_start_date = Some(date(2024, 2, 1));
        let mut h = harness(config);

        h.notifier.set_failing(true);
        h.source.set(0, 0);
        let report = h.monitor.tick(date(2024, 3, 1)).await;

        assert!(report.cycle_closed);
        assert_eq!(h.monitor.config.statistics.total_received, 0);
        assert_eq!(
            h.monitor.config.statistics.cycle_start_date,
            Some(date(2024, 3, 1))
        );
    }

    #[tokio::test]
    async fn test_first_run_starts_cycle_quietly() {
        let mut config = base_config();
        config.statistics = CycleState::default();
        let mut h = harness(config);

        h.source.set(4_096, 1_024);
        let report = h.monitor.tick(date(2024, 3, 10)).await;

        assert!(report.cycle_closed);
        assert!(h.notifier.messages().is_empty());
        let stats = &h.monitor.config.statistics;
        assert_eq!(stats.cycle_start_date, Some(date(2024, 3, 10)));
        assert_eq!(stats.total_received, 4_096);
        assert_eq!(stats.total_transmitted, 1_024);
    }

    #[tokio::test]
    async fn test_source_unavailable_skips_tick() {
        let mut config = base_config();
        config.statistics.total_received = 777;
        config.statistics.last_received = 100;
        let mut h = harness(config);

        h.source.unplug();
        let report = h.monitor.tick(date(2024, 3, 10)).await;

        assert!(!report.sampled);
        assert_eq!(h.monitor.config.statistics.total_received, 777);
        assert_eq!(h.monitor.config.statistics.last_received, 100);
        assert!(!h.path.exists());
    }

    #[tokio::test]
    async fn test_unknown_category_skips_alerts() {
        let mut config = base_config();
        config.comparison.category = "sideways".to_string();
        let mut h = harness(config);

        h.source.set(gb(99.0), gb(99.0));
        let report = h.monitor.tick(date(2024, 3, 10)).await;

        assert!(report.sampled);
        assert!(report.alerts_delivered.is_empty());
        assert!(h.notifier.messages().is_empty());
        assert_eq!(
            Config::load(&h.path).unwrap().statistics.total_received,
            gb(99.0)
        );
    }

    /// Delivers the first message, then never completes
    #[derive(Clone, Default)]
    struct StallingNotifier {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Notifier for StallingNotifier {
        fn channel(&self) -> Channel {
            Channel::Gotify
        }

        async fn send(&self, _message: &str) -> Result<(), DeliveryError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(());
            }
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_flag_saved_before_next_alert() {
        let mut config = base_config();
        config.comparison.category = "download".to_string();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let source = FakeSource::default();
        let notifier = StallingNotifier::default();
        let mut monitor = QuotaMonitor::new(
            config,
            path.clone(),
            Box::new(source.clone()),
            Ok(Box::new(notifier.clone())),
            Box::new(FakePower::default()),
        );

        source.set(gb(97.0), 0);
        let result =
            tokio::time::timeout(Duration::from_secs(2), monitor.tick(date(2024, 3, 10))).await;
        assert!(result.is_err());
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);

        let saved = Config::load(&path).unwrap().alert_flags(Channel::Gotify);
        assert!(saved.threshold_fired);
        assert!(!saved.ratio_fired);
    }

    #[tokio::test]
    async fn test_missing_notifier_still_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::default();
        let mut monitor = QuotaMonitor::new(
            base_config(),
            dir.path().join("config.json"),
            Box::new(source.clone()),
            Err(ConfigError::UnknownChannel("carrier-pigeon".to_string())),
            Box::new(FakePower::default()),
        );

        source.set(gb(99.0), 0);
        let report = monitor.tick(date(2024, 3, 10)).await;

        assert!(report.sampled);
        assert!(report.alerts_delivered.is_empty());
        assert_eq!(monitor.config.alert_flags(Channel::Gotify), AlertFlags::default());
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_state_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let source = FakeSource::default();
        let mut monitor = QuotaMonitor::new(
            base_config(),
            blocker.join("config.json"),
            Box::new(source.clone()),
            Ok(Box::new(FakeNotifier::default())),
            Box::new(FakePower::default()),
        );

        source.set(100, 200);
        monitor.tick(date(2024, 3, 10)).await;
        source.set(150, 260);
        let report = monitor.tick(date(2024, 3, 10)).await;

        assert!(report.sampled);
        assert_eq!(monitor.config.statistics.total_received, 150);
        assert_eq!(monitor.config.statistics.total_transmitted, 260);
    }

    #[tokio::test]
    async fn test_counter_reset_across_ticks() {
        let mut h = harness(base_config());
        let today = date(2024, 3, 10);

        h.source.set(5_000, 5_000);
        h.monitor.tick(today).await;
        // Host rebooted, counters restarted
        h.source.set(300, 200);
        h.monitor.tick(today).await;
        h.source.set(400, 250);
        h.monitor.tick(today).await;

        let stats = &h.monitor.config.statistics;
        assert_eq!(stats.total_received, 5_000 + 300 + 100);
        assert_eq!(stats.total_transmitted, 5_000 + 200 + 50);
    }

    #[test]
    fn test_check_interface() {
        let h = harness(base_config());
        assert!(h.monitor.check_interface().is_err());

        h.source.set(1, 1);
        assert!(h.monitor.check_interface().is_ok());
    }
}
