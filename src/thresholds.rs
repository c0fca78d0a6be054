//! Alert thresholds and threshold evaluation.
//!
//! Thresholds come from two places: the local config file and the
//! server (`GET /agent/config`). Remote values win, but only move
//! forward: a threshold set is applied only when its version is
//! strictly greater than the one already in effect, so re-delivered or
//! stale configs never downgrade the agent.

use crate::config::MonitoringConfig;
use crate::metrics::{ActiveThresholds, MetricsSnapshot};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Default delay between remote config polls, in seconds.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;

/// CPU usage above this is critical rather than warning.
const CPU_CRITICAL_PERCENT: f64 = 90.0;

/// Memory usage above this is critical rather than warning.
const MEMORY_CRITICAL_PERCENT: f64 = 95.0;

/// Disk usage above this is critical rather than warning.
const DISK_CRITICAL_PERCENT: f64 = 95.0;

/// Configuration pushed by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAgentConfig {
    /// Monotonically increasing version of the threshold set.
    #[serde(default)]
    pub threshold_version: u64,
    /// Threshold overrides by metric name (`cpu`, `memory`, `disk`).
    #[serde(default, deserialize_with = "lenient_threshold_map")]
    pub thresholds: BTreeMap<String, f64>,
    /// Seconds until the next config poll.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

/// Accepts threshold values as JSON numbers or numeric strings; other
/// shapes are dropped rather than failing the whole config fetch.
fn lenient_threshold_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::Number(n) => n.as_f64().map(|f| (key, f)),
            serde_json::Value::String(s) => s.trim().parse().ok().map(|f| (key, f)),
            _ => None,
        })
        .collect())
}

/// Resolves thresholds, preferring remote values over local config.
#[derive(Debug, Clone)]
pub struct ThresholdManager {
    local: MonitoringConfig,
    remote: BTreeMap<String, f64>,
    version: u64,
}

impl ThresholdManager {
    /// Creates a manager with only local thresholds in effect.
    #[must_use]
    pub fn new(local: MonitoringConfig) -> Self {
        Self { local, remote: BTreeMap::new(), version: 0 }
    }

    /// Applies a server config if its version is newer.
    ///
    /// Returns true when the threshold set changed.
    pub fn apply_remote(&mut self, config: &RemoteAgentConfig) -> bool {
        if config.threshold_version <= self.version {
            debug!(
                version = config.threshold_version,
                current = self.version,
                "threshold config unchanged"
            );
            return false;
        }

        self.remote = config.thresholds.clone();
        self.version = config.threshold_version;
        info!(
            version = self.version,
            thresholds = ?self.remote,
            "applied remote thresholds"
        );
        true
    }

    /// Resolved CPU threshold.
    #[must_use]
    pub fn cpu(&self) -> f64 {
        self.remote.get("cpu").copied().unwrap_or(self.local.cpu_threshold)
    }

    /// Resolved memory threshold.
    #[must_use]
    pub fn memory(&self) -> f64 {
        self.remote.get("memory").copied().unwrap_or(self.local.memory_threshold)
    }

    /// Resolved disk threshold.
    #[must_use]
    pub fn disk(&self) -> f64 {
        self.remote.get("disk").copied().unwrap_or(self.local.disk_threshold)
    }

    /// Version of the applied remote set (0 when none).
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// True when any remote thresholds are in effect.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        !self.remote.is_empty()
    }

    /// Snapshot of the resolved thresholds for the wire format.
    #[must_use]
    pub fn active(&self) -> ActiveThresholds {
        ActiveThresholds {
            cpu: self.cpu(),
            memory: self.memory(),
            disk: self.disk(),
            version: self.version,
            source: if self.is_remote() { "remote" } else { "local" },
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Threshold exceeded.
    Warning,
    /// Far past the threshold, or a hard failure.
    Critical,
}

/// Alert category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// CPU usage over threshold.
    CpuHigh,
    /// Memory usage over threshold.
    MemoryHigh,
    /// A mount over the disk usage threshold.
    DiskHigh,
    /// A monitored service is not active.
    ServiceDown,
}

/// An alert, as posted to `/agent/alerts`.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    /// Alert category.
    #[serde(rename = "type")]
    pub kind: AlertKind,
    /// Human-readable description.
    pub message: String,
    /// Severity classification.
    pub severity: Severity,
    /// Timestamp of the snapshot that triggered the alert.
    pub timestamp: u64,
    /// Numeric facts backing the alert.
    pub metadata: serde_json::Value,
}

/// Evaluates a snapshot against its active thresholds.
///
/// Sections that failed to collect are skipped; they cannot prove or
/// disprove a threshold breach.
#[must_use]
pub fn evaluate(snapshot: &MetricsSnapshot) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let thresholds = &snapshot.active_thresholds;
    let timestamp = snapshot.timestamp;

    if let Some(cpu) = snapshot.cpu.as_ok() {
        let usage = cpu.usage_percent;
        debug!(usage, threshold = thresholds.cpu, "checking cpu threshold");
        if usage > thresholds.cpu {
            alerts.push(Alert {
                kind: AlertKind::CpuHigh,
                message: format!(
                    "CPU usage is {usage:.1}% (threshold: {}%)",
                    thresholds.cpu
                ),
                severity: if usage < CPU_CRITICAL_PERCENT {
                    Severity::Warning
                } else {
                    Severity::Critical
                },
                timestamp,
                metadata: serde_json::json!({
                    "usage": usage,
                    "threshold": thresholds.cpu,
                }),
            });
        }
    }

    if let Some(memory) = snapshot.memory.as_ok() {
        let usage = memory.percent;
        if usage > thresholds.memory {
            alerts.push(Alert {
                kind: AlertKind::MemoryHigh,
                message: format!(
                    "Memory usage is {usage:.1}% (threshold: {}%)",
                    thresholds.memory
                ),
                severity: if usage < MEMORY_CRITICAL_PERCENT {
                    Severity::Warning
                } else {
                    Severity::Critical
                },
                timestamp,
                metadata: serde_json::json!({
                    "usage": usage,
                    "threshold": thresholds.memory,
                }),
            });
        }
    }

    if let Some(disks) = snapshot.disk.as_ok() {
        for (mount, usage) in disks {
            let percent = usage.percent;
            if percent > thresholds.disk {
                alerts.push(Alert {
                    kind: AlertKind::DiskHigh,
                    message: format!(
                        "Disk usage on {mount} is {percent:.1}% (threshold: {}%)",
                        thresholds.disk
                    ),
                    severity: if percent < DISK_CRITICAL_PERCENT {
                        Severity::Warning
                    } else {
                        Severity::Critical
                    },
                    timestamp,
                    metadata: serde_json::json!({
                        "mount": mount,
                        "usage": percent,
                        "threshold": thresholds.disk,
                    }),
                });
            }
        }
    }

    if let Some(services) = snapshot.services.as_ok() {
        for (name, status) in services {
            if !status.active {
                alerts.push(Alert {
                    kind: AlertKind::ServiceDown,
                    message: format!("Service {name} is not active"),
                    severity: Severity::Critical,
                    timestamp,
                    metadata: serde_json::json!({
                        "service": name,
                        "status": status.status,
                    }),
                });
            }
        }
    }

    alerts
}
