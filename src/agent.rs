//! The agent: collection cycles, delivery with offline buffering, and
//! the reporting loop.
//!
//! A cycle never aborts the loop: collector failures ride along in the
//! snapshot, delivery failures park the snapshot in the buffer, and
//! alert delivery failures are logged per alert.

use crate::buffer::MetricBuffer;
use crate::client::{ApiClient, RegistrationReply};
use crate::collectors::SystemCollectors;
use crate::config::AgentConfig;
use crate::error::Result;
use crate::metrics::{
    epoch_secs, hostname, platform_string, MetricsEnvelope, MetricsSnapshot, Registration,
    AGENT_VERSION,
};
use crate::thresholds::{self, Alert, ThresholdManager, DEFAULT_CHECK_INTERVAL_SECS};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// After this many consecutive delivery failures, snapshots are no
/// longer buffered (the backlog would only grow stale).
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// The monitoring agent.
#[derive(Debug)]
pub struct Agent {
    config: AgentConfig,
    client: ApiClient,
    collectors: SystemCollectors,
    thresholds: ThresholdManager,
    buffer: MetricBuffer<MetricsSnapshot>,
    consecutive_failures: u32,
    last_config_check: Option<Instant>,
    check_interval: Duration,
}

impl Agent {
    /// Builds an agent from configuration. `config_dir` holds
    /// `disks.json` (normally `/etc/uptimesquirrel`).
    ///
    /// # Errors
    ///
    /// Fails when the API client cannot be constructed (invalid key).
    pub fn new(config: AgentConfig, config_dir: &Path) -> Result<Self> {
        let client = ApiClient::new(&config.api)?;
        let collectors = SystemCollectors::new(&config, config_dir);
        let thresholds = ThresholdManager::new(config.monitoring.clone());

        Ok(Self {
            config,
            client,
            collectors,
            thresholds,
            buffer: MetricBuffer::default(),
            consecutive_failures: 0,
            last_config_check: None,
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
        })
    }

    /// Resolved thresholds currently in effect.
    #[must_use]
    pub fn thresholds(&self) -> &ThresholdManager {
        &self.thresholds
    }

    /// Configured API base URL.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.config.api.url
    }

    /// Fetches and applies remote configuration. Failures leave the
    /// current thresholds in effect.
    pub async fn refresh_remote_config(&mut self) {
        match self.client.fetch_agent_config().await {
            Ok(Some(remote)) => {
                self.thresholds.apply_remote(&remote);
                self.check_interval = Duration::from_secs(remote.check_interval.max(1));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to fetch remote config"),
        }
        self.last_config_check = Some(Instant::now());
    }

    /// The registration payload for this host.
    #[must_use]
    pub fn registration(&self) -> Registration {
        Registration {
            hostname: hostname(),
            agent_version: AGENT_VERSION,
            platform: platform_string(),
            registration_time: epoch_secs(),
            cpu_count: self.collectors.cpu_count(),
            total_memory: self.collectors.total_memory(),
            disk_paths: self.collectors.disk_paths(),
            monitored_services: self.config.services.clone(),
        }
    }

    /// Registers this host with the API.
    ///
    /// Not part of the reporting loop: agents are normally provisioned
    /// through the web UI and arrive with a key already issued.
    pub async fn register(&self) -> Result<RegistrationReply> {
        info!(hostname = %hostname(), "registering agent");
        self.client.register(&self.registration()).await
    }

    /// Runs one collection/reporting cycle.
    pub async fn run_once(&mut self) {
        if self.config_check_due() {
            self.refresh_remote_config().await;
        }

        let snapshot = self.collectors.collect_snapshot(self.thresholds.active());
        let alerts = thresholds::evaluate(&snapshot);

        self.deliver(snapshot).await;
        self.send_alerts(&alerts).await;
    }

    /// Main loop: one cycle per interval, forever.
    pub async fn run(&mut self) {
        info!(
            version = AGENT_VERSION,
            hostname = %hostname(),
            api_url = %self.config.api.url,
            interval_secs = self.config.monitoring.interval_secs,
            "starting agent"
        );

        self.refresh_remote_config().await;
        info!(
            cpu = self.thresholds.cpu(),
            memory = self.thresholds.memory(),
            disk = self.thresholds.disk(),
            source = if self.thresholds.is_remote() { "remote" } else { "local" },
            "thresholds in effect"
        );

        let interval = self.config.interval();
        loop {
            let start = Instant::now();
            self.run_once().await;

            if let Some(sleep_for) = interval.checked_sub(start.elapsed()) {
                debug!(secs = sleep_for.as_secs_f64(), "sleeping until next cycle");
                tokio::time::sleep(sleep_for).await;
            }
        }
    }

    fn config_check_due(&self) -> bool {
        self.last_config_check
            .map_or(true, |checked| checked.elapsed() >= self.check_interval)
    }

    async fn deliver(&mut self, snapshot: MetricsSnapshot) {
        match self.client.report_metrics(&MetricsEnvelope::new(&snapshot)).await {
            Ok(()) => {
                self.record_success();
                self.flush_buffer().await;
                debug!("metrics reported");
            }
            Err(e) => {
                error!(
                    error = %e,
                    consecutive = self.consecutive_failures + 1,
                    "failed to report metrics"
                );
                self.record_failure(snapshot);
            }
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self, snapshot: MetricsSnapshot) {
        self.consecutive_failures += 1;
        if self.consecutive_failures < MAX_CONSECUTIVE_FAILURES {
            self.buffer.push(snapshot);
            info!(buffered = self.buffer.len(), "buffered metrics for later delivery");
        } else {
            error!("max consecutive delivery failures reached, metrics may be lost");
        }
    }

    async fn flush_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        info!(count = self.buffer.len(), "sending buffered metrics");
        for buffered in self.buffer.drain() {
            if let Err(e) = self.client.report_metrics(&MetricsEnvelope::new(&buffered)).await {
                error!(error = %e, "failed to send buffered metrics");
            }
        }
    }

    async fn send_alerts(&self, alerts: &[Alert]) {
        for alert in alerts {
            warn!(kind = ?alert.kind, message = %alert.message, "alert raised");
            match self.client.send_alert(alert).await {
                Ok(()) => info!(kind = ?alert.kind, "alert sent"),
                Err(e) => error!(kind = ?alert.kind, error = %e, "failed to send alert"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ActiveThresholds, ProcessSample, Section, ThermalSample};
    use std::collections::BTreeMap;

    fn test_agent() -> (Agent, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let agent = Agent::new(AgentConfig::default(), dir.path()).unwrap();
        (agent, dir)
    }

    fn dummy_snapshot(timestamp: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            hostname: "h".to_string(),
            timestamp,
            uptime: 1,
            agent_version: AGENT_VERSION,
            active_thresholds: ActiveThresholds {
                cpu: 80.0,
                memory: 85.0,
                disk: 90.0,
                version: 0,
                source: "local",
            },
            cpu: Section::Failed { error: "test".to_string() },
            memory: Section::Failed { error: "test".to_string() },
            disk: Section::Ok(BTreeMap::new()),
            disk_io: Section::Ok(BTreeMap::new()),
            network: Section::Ok(BTreeMap::new()),
            services: Section::Ok(BTreeMap::new()),
            sensors: Section::Ok(ThermalSample::default()),
            processes: Section::Ok(ProcessSample::default()),
        }
    }

    #[test]
    fn test_config_check_due_initially() {
        let (agent, _dir) = test_agent();
        assert!(agent.config_check_due());
    }

    #[test]
    fn test_config_check_not_due_right_after_check() {
        let (mut agent, _dir) = test_agent();
        agent.last_config_check = Some(Instant::now());
        assert!(!agent.config_check_due());
    }

    #[test]
    fn test_failures_buffer_until_limit() {
        let (mut agent, _dir) = test_agent();

        for i in 0..4 {
            agent.record_failure(dummy_snapshot(i));
        }
        assert_eq!(agent.buffer.len(), 4);
        assert_eq!(agent.consecutive_failures, 4);

        // Fifth consecutive failure stops buffering.
        agent.record_failure(dummy_snapshot(4));
        assert_eq!(agent.buffer.len(), 4);
        assert_eq!(agent.consecutive_failures, 5);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let (mut agent, _dir) = test_agent();
        agent.record_failure(dummy_snapshot(0));
        agent.record_failure(dummy_snapshot(1));

        agent.record_success();
        assert_eq!(agent.consecutive_failures, 0);
        // Buffered snapshots stay queued until flushed.
        assert_eq!(agent.buffer.len(), 2);
    }

    #[test]
    fn test_buffered_snapshots_keep_original_timestamps() {
        let (mut agent, _dir) = test_agent();
        agent.record_failure(dummy_snapshot(111));
        agent.record_failure(dummy_snapshot(222));

        let drained = agent.buffer.drain();
        let timestamps: Vec<u64> = drained.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![111, 222]);

        // The envelope carries the snapshot's own timestamp.
        assert_eq!(MetricsEnvelope::new(&drained[0]).timestamp, 111);
    }

    #[test]
    fn test_registration_payload() {
        let (agent, _dir) = test_agent();
        let registration = agent.registration();

        assert!(!registration.hostname.is_empty());
        assert_eq!(registration.agent_version, AGENT_VERSION);
        assert!(!registration.platform.is_empty());
        assert!(registration.registration_time > 0);
        assert!(registration.monitored_services.is_empty());
    }

    #[test]
    fn test_registration_includes_configured_services() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig::parse("[services]\nmonitor_nginx = true\n").unwrap();
        let agent = Agent::new(config, dir.path()).unwrap();

        assert_eq!(agent.registration().monitored_services, vec!["nginx"]);
    }

    #[test]
    fn test_agent_rejects_invalid_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AgentConfig::default();
        config.api.key = "bad\nkey".to_string();

        assert!(Agent::new(config, dir.path()).is_err());
    }
}
