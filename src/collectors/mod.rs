//! Metric collectors.
//!
//! One module per metric source. Each collector parses its own corner
//! of `/proc` or `/sys` (or shells out with a timeout, for service
//! checks) and returns a typed sample ready for serialization.

pub mod cpu;
pub mod disk;
pub mod disk_io;
pub mod memory;
pub mod network;
pub mod process;
pub mod service;
pub mod thermal;

pub use cpu::CpuCollector;
pub use disk::DiskCollector;
pub use disk_io::DiskIoCollector;
pub use memory::MemoryCollector;
pub use network::NetworkCollector;
pub use process::ProcessCollector;
pub use service::ServiceCollector;
pub use thermal::ThermalCollector;

use crate::config::AgentConfig;
use crate::error::Result;
use crate::metrics::{
    ActiveThresholds, MetricsSnapshot, Section, epoch_secs, hostname, uptime_secs, AGENT_VERSION,
};
use serde::Serialize;
use std::path::Path;
use tracing::error;

/// Trait for metric collectors.
///
/// Collectors keep whatever state they need between cycles (previous
/// counters for delta calculations, cached config) and produce a typed
/// sample per cycle.
pub trait Collector {
    /// The sample type this collector produces.
    type Sample: Serialize;

    /// Stable identifier, used in logs and error reports.
    fn id(&self) -> &'static str;

    /// Returns true if this collector can run on the current system.
    fn is_available(&self) -> bool {
        true
    }

    /// Collects one sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source cannot be read. Errors
    /// are reported in-band per section and never abort a cycle.
    fn collect(&mut self) -> Result<Self::Sample>;
}

/// Rounds to two decimals, matching the wire format for packet and
/// IOPS rates.
#[must_use]
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// All system collectors, collected in a fixed order each cycle.
#[derive(Debug)]
pub struct SystemCollectors {
    cpu: CpuCollector,
    memory: MemoryCollector,
    disk: DiskCollector,
    disk_io: DiskIoCollector,
    network: NetworkCollector,
    services: ServiceCollector,
    sensors: ThermalCollector,
    processes: ProcessCollector,
}

impl SystemCollectors {
    /// Builds the collector set from agent configuration.
    ///
    /// `config_dir` is where `disks.json` lives (normally
    /// `/etc/uptimesquirrel`).
    #[must_use]
    pub fn new(config: &AgentConfig, config_dir: &Path) -> Self {
        Self {
            cpu: CpuCollector::new(),
            memory: MemoryCollector::new(),
            disk: DiskCollector::new(config_dir),
            disk_io: DiskIoCollector::new(),
            network: NetworkCollector::new(),
            services: ServiceCollector::new(config.services.clone()),
            sensors: ThermalCollector::new(),
            processes: ProcessCollector::new(),
        }
    }

    /// Runs every collector and assembles the snapshot.
    ///
    /// Individual collector failures are logged and recorded in-band;
    /// the snapshot is always produced.
    pub fn collect_snapshot(&mut self, thresholds: ActiveThresholds) -> MetricsSnapshot {
        MetricsSnapshot {
            hostname: hostname(),
            timestamp: epoch_secs(),
            uptime: uptime_secs(),
            agent_version: AGENT_VERSION,
            active_thresholds: thresholds,
            cpu: section(&mut self.cpu),
            memory: section(&mut self.memory),
            disk: section(&mut self.disk),
            disk_io: section(&mut self.disk_io),
            network: section(&mut self.network),
            services: section(&mut self.services),
            sensors: section(&mut self.sensors),
            processes: section(&mut self.processes),
        }
    }

    /// Number of CPU cores, for the registration payload.
    #[must_use]
    pub fn cpu_count(&self) -> u64 {
        self.cpu.core_count()
    }

    /// Total physical memory in bytes, for the registration payload.
    #[must_use]
    pub fn total_memory(&self) -> u64 {
        self.memory.total_bytes()
    }

    /// Currently mounted paths, for the registration payload.
    #[must_use]
    pub fn disk_paths(&self) -> Vec<String> {
        self.disk.mount_points()
    }
}

fn section<C: Collector>(collector: &mut C) -> Section<C::Sample> {
    match collector.collect() {
        Ok(sample) => Section::Ok(sample),
        Err(e) => {
            error!(collector = collector.id(), error = %e, "metric collection failed");
            Section::Failed { error: e.to_string() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.005), 1.01);
        assert_eq!(round2(0.0), 0.0);
        assert_eq!(round2(123.4567), 123.46);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_collect_snapshot_produces_all_sections() {
        let config = AgentConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let mut collectors = SystemCollectors::new(&config, dir.path());

        let snapshot = collectors.collect_snapshot(ActiveThresholds {
            cpu: 80.0,
            memory: 85.0,
            disk: 90.0,
            version: 0,
            source: "local",
        });

        assert!(!snapshot.hostname.is_empty());
        assert!(snapshot.timestamp > 0);
        assert!(snapshot.cpu.as_ok().is_some());
        assert!(snapshot.memory.as_ok().is_some());
        assert!(snapshot.processes.as_ok().is_some());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_registration_facts() {
        let config = AgentConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let collectors = SystemCollectors::new(&config, dir.path());

        assert!(collectors.cpu_count() >= 1);
        assert!(collectors.total_memory() > 0);
    }
}
