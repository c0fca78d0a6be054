//! Wire-format types for metric reports.
//!
//! These structs serialize to the exact JSON shapes the agent API
//! ingests. Collector failures are reported in-band: a failed section
//! serializes as `{"error": "..."}` instead of its sample so the server
//! sees partial data rather than nothing.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Agent version reported in every payload.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One section of a metrics snapshot: either the collected sample or
/// the collection error.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Section<T> {
    /// Collected successfully.
    Ok(T),
    /// Collection failed; the message is forwarded to the server.
    Failed {
        /// Error message from the collector.
        error: String,
    },
}

impl<T> Section<T> {
    /// Returns the sample if collection succeeded.
    #[must_use]
    pub fn as_ok(&self) -> Option<&T> {
        match self {
            Self::Ok(sample) => Some(sample),
            Self::Failed { .. } => None,
        }
    }
}

/// Load averages over the standard three windows.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LoadAverage {
    /// 1-minute load average.
    #[serde(rename = "1min")]
    pub one: f64,
    /// 5-minute load average.
    #[serde(rename = "5min")]
    pub five: f64,
    /// 15-minute load average.
    #[serde(rename = "15min")]
    pub fifteen: f64,
}

/// CPU section.
#[derive(Debug, Clone, Serialize)]
pub struct CpuSample {
    /// Total CPU usage percentage since the previous cycle.
    pub usage_percent: f64,
    /// Number of CPU cores.
    pub count: u64,
    /// Load averages.
    pub load_average: LoadAverage,
}

/// Swap usage.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SwapSample {
    /// Total swap in bytes.
    pub total: u64,
    /// Used swap in bytes.
    pub used: u64,
    /// Free swap in bytes.
    pub free: u64,
    /// Used percentage (0 when no swap is configured).
    pub percent: f64,
}

/// Memory section (all sizes in bytes).
#[derive(Debug, Clone, Serialize)]
pub struct MemorySample {
    /// Total physical memory.
    pub total: u64,
    /// Memory available for new allocations.
    pub available: u64,
    /// Used memory (`total - available`).
    pub used: u64,
    /// Completely free memory.
    pub free: u64,
    /// Used percentage.
    pub percent: f64,
    /// Swap usage.
    pub swap: SwapSample,
}

/// Usage of one mounted filesystem.
#[derive(Debug, Clone, Serialize)]
pub struct DiskUsageSample {
    /// Device path (e.g. `/dev/sda1`).
    pub device: String,
    /// Filesystem type.
    pub fstype: String,
    /// Total size in bytes.
    pub total: u64,
    /// Used bytes.
    pub used: u64,
    /// Free bytes.
    pub free: u64,
    /// Used percentage.
    pub percent: f64,
    /// Human-readable label shown in the dashboard.
    pub description: String,
}

/// I/O rates and counters for one disk device.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiskIoSample {
    /// Read throughput since the previous cycle.
    pub read_bytes_per_sec: u64,
    /// Write throughput since the previous cycle.
    pub write_bytes_per_sec: u64,
    /// Read operations per second (2-decimal).
    pub read_iops: f64,
    /// Write operations per second (2-decimal).
    pub write_iops: f64,
    /// Cumulative completed reads.
    pub read_count: u64,
    /// Cumulative completed writes.
    pub write_count: u64,
    /// Cumulative bytes read.
    pub read_bytes: u64,
    /// Cumulative bytes written.
    pub write_bytes: u64,
}

/// Traffic counters and rates for one network interface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InterfaceSample {
    /// Cumulative bytes transmitted.
    pub bytes_sent: u64,
    /// Cumulative bytes received.
    pub bytes_recv: u64,
    /// Cumulative packets transmitted.
    pub packets_sent: u64,
    /// Cumulative packets received.
    pub packets_recv: u64,
    /// Transmit throughput since the previous cycle.
    pub bytes_sent_per_sec: u64,
    /// Receive throughput since the previous cycle.
    pub bytes_recv_per_sec: u64,
    /// Transmit packet rate (2-decimal).
    pub packets_sent_per_sec: f64,
    /// Receive packet rate (2-decimal).
    pub packets_recv_per_sec: f64,
    /// Cumulative receive errors.
    pub errin: u64,
    /// Cumulative transmit errors.
    pub errout: u64,
    /// Cumulative inbound drops.
    pub dropin: u64,
    /// Cumulative outbound drops.
    pub dropout: u64,
}

/// Backend that produced a service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// systemd unit checked via `systemctl is-active`.
    Systemd,
    /// Docker container checked via `docker inspect`.
    Docker,
}

/// Health of one monitored service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    /// Whether the service counts as up for alerting.
    pub active: bool,
    /// Raw status string (`active`, `inactive`, `running (healthy)`...).
    pub status: String,
    /// Which backend produced the check.
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    /// Container name for Docker checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// Container restart count for Docker checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_count: Option<u64>,
    /// Container health-check state, when one is defined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_status: Option<String>,
    /// Error message when the check itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Temperature section. Keys are omitted when no sensor matched.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ThermalSample {
    /// Hottest CPU sensor reading in Celsius.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_temp: Option<f64>,
    /// Hottest GPU sensor reading in Celsius.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_temp: Option<f64>,
}

/// Process counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProcessSample {
    /// Number of processes.
    pub count: u64,
    /// Total threads across all processes.
    pub thread_count: u64,
}

/// Thresholds in effect when a snapshot was taken.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveThresholds {
    /// CPU usage threshold (percent).
    pub cpu: f64,
    /// Memory usage threshold (percent).
    pub memory: f64,
    /// Disk usage threshold (percent).
    pub disk: f64,
    /// Version of the applied remote threshold set (0 = none).
    pub version: u64,
    /// `"remote"` or `"local"`.
    pub source: &'static str,
}

/// One full collection cycle, as posted to `/agent/metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Reporting host.
    pub hostname: String,
    /// Collection time, epoch seconds.
    pub timestamp: u64,
    /// Host uptime in whole seconds.
    pub uptime: u64,
    /// Agent version string.
    pub agent_version: &'static str,
    /// Thresholds in effect for this cycle.
    pub active_thresholds: ActiveThresholds,
    /// CPU metrics.
    pub cpu: Section<CpuSample>,
    /// Memory metrics.
    pub memory: Section<MemorySample>,
    /// Disk usage per mountpoint.
    pub disk: Section<BTreeMap<String, DiskUsageSample>>,
    /// Disk I/O per device.
    pub disk_io: Section<BTreeMap<String, DiskIoSample>>,
    /// Network traffic per interface.
    pub network: Section<BTreeMap<String, InterfaceSample>>,
    /// Service health per configured service.
    pub services: Section<BTreeMap<String, ServiceStatus>>,
    /// Temperatures.
    pub sensors: Section<ThermalSample>,
    /// Process counts.
    pub processes: Section<ProcessSample>,
}

/// Envelope wrapped around a snapshot for `/agent/metrics`.
///
/// Buffered snapshots are re-sent with their original timestamps, so
/// the envelope timestamp comes from the snapshot, not the clock.
#[derive(Debug, Serialize)]
pub struct MetricsEnvelope<'a> {
    /// Agent version string.
    pub agent_version: &'static str,
    /// Snapshot collection time, epoch seconds.
    pub timestamp: u64,
    /// The snapshot itself.
    pub metrics: &'a MetricsSnapshot,
}

impl<'a> MetricsEnvelope<'a> {
    /// Wraps a snapshot for delivery.
    #[must_use]
    pub fn new(metrics: &'a MetricsSnapshot) -> Self {
        Self { agent_version: AGENT_VERSION, timestamp: metrics.timestamp, metrics }
    }
}

/// Registration payload for `/agent/register`.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    /// Reporting host.
    pub hostname: String,
    /// Agent version string.
    pub agent_version: &'static str,
    /// Platform description (`Linux-<release>-<arch>`).
    pub platform: String,
    /// Registration time, epoch seconds.
    pub registration_time: u64,
    /// Number of CPU cores.
    pub cpu_count: u64,
    /// Total physical memory in bytes.
    pub total_memory: u64,
    /// Mountpoints visible at registration time.
    pub disk_paths: Vec<String>,
    /// Services configured for monitoring.
    pub monitored_services: Vec<String>,
}

/// Current time as epoch seconds.
#[must_use]
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Host uptime in whole seconds from `/proc/uptime`.
#[must_use]
pub fn uptime_secs() -> u64 {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/uptime")
            .ok()
            .and_then(|content| {
                content
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.parse::<f64>().ok())
            })
            .map(|secs| secs as u64)
            .unwrap_or(0)
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

/// The local hostname.
#[must_use]
pub fn hostname() -> String {
    #[cfg(target_os = "linux")]
    {
        if let Ok(name) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
            let name = name.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Platform description, e.g. `Linux-6.8.0-x86_64`.
#[must_use]
pub fn platform_string() -> String {
    #[cfg(target_os = "linux")]
    {
        let release = std::fs::read_to_string("/proc/sys/kernel/osrelease")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        format!("Linux-{}-{}", release, std::env::consts::ARCH)
    }
    #[cfg(not(target_os = "linux"))]
    {
        format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
    }
}
