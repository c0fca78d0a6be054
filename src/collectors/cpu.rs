//! CPU metrics collector.
//!
//! Parses `/proc/stat` and `/proc/loadavg`. Usage is computed from the
//! delta between consecutive cycles, so the first cycle reports 0.

use super::Collector;
use crate::error::{AgentError, Result};
use crate::metrics::{CpuSample, LoadAverage};

/// Cumulative CPU time counters from the aggregate `cpu ` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CpuTimes {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    irq: u64,
    softirq: u64,
    steal: u64,
}

impl CpuTimes {
    fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Idle time includes iowait.
    fn idle_time(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// Collector for CPU usage and load averages.
#[derive(Debug)]
pub struct CpuCollector {
    /// Previous cycle's counters for the delta calculation.
    prev: Option<CpuTimes>,
    /// Number of CPU cores.
    core_count: u64,
}

impl CpuCollector {
    /// Creates a new CPU collector.
    #[must_use]
    pub fn new() -> Self {
        Self { prev: None, core_count: Self::detect_core_count() }
    }

    /// Returns the number of CPU cores.
    #[must_use]
    pub fn core_count(&self) -> u64 {
        self.core_count
    }

    /// Counts `cpuN` lines in /proc/stat.
    fn detect_core_count() -> u64 {
        #[cfg(target_os = "linux")]
        {
            std::fs::read_to_string("/proc/stat")
                .map(|content| {
                    content
                        .lines()
                        .filter(|line| line.starts_with("cpu") && !line.starts_with("cpu "))
                        .count() as u64
                })
                .unwrap_or(1)
                .max(1)
        }
        #[cfg(not(target_os = "linux"))]
        {
            1
        }
    }

    /// Parses the aggregate `cpu ` line out of /proc/stat content.
    fn parse_aggregate(content: &str) -> Result<CpuTimes> {
        content
            .lines()
            .find(|line| line.starts_with("cpu "))
            .map(Self::parse_cpu_line)
            .transpose()?
            .ok_or_else(|| AgentError::CollectionFailed {
                collector: "cpu",
                message: "no aggregate cpu line in /proc/stat".to_string(),
            })
    }

    fn parse_cpu_line(line: &str) -> Result<CpuTimes> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 8 {
            return Err(AgentError::CollectionFailed {
                collector: "cpu",
                message: format!("short cpu line in /proc/stat: {line}"),
            });
        }

        let field = |i: usize| parts.get(i).and_then(|s| s.parse().ok()).unwrap_or(0);

        Ok(CpuTimes {
            user: field(1),
            nice: field(2),
            system: field(3),
            idle: field(4),
            iowait: field(5),
            irq: field(6),
            softirq: field(7),
            steal: field(8),
        })
    }

    /// Usage percentage from the delta between two samples.
    fn usage_percent(prev: &CpuTimes, curr: &CpuTimes) -> f64 {
        let total_delta = curr.total().saturating_sub(prev.total());
        if total_delta == 0 {
            return 0.0;
        }

        let idle_delta = curr.idle_time().saturating_sub(prev.idle_time());
        let busy_delta = total_delta.saturating_sub(idle_delta);
        (busy_delta as f64 / total_delta as f64) * 100.0
    }

    fn read_load_average() -> LoadAverage {
        #[cfg(target_os = "linux")]
        {
            std::fs::read_to_string("/proc/loadavg")
                .ok()
                .and_then(|content| Self::parse_loadavg(&content))
                .unwrap_or_default()
        }
        #[cfg(not(target_os = "linux"))]
        {
            LoadAverage::default()
        }
    }

    fn parse_loadavg(content: &str) -> Option<LoadAverage> {
        let mut parts = content.split_whitespace();
        Some(LoadAverage {
            one: parts.next()?.parse().ok()?,
            five: parts.next()?.parse().ok()?,
            fifteen: parts.next()?.parse().ok()?,
        })
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    type Sample = CpuSample;

    fn id(&self) -> &'static str {
        "cpu"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && std::path::Path::new("/proc/stat").exists()
    }

    fn collect(&mut self) -> Result<Self::Sample> {
        if !cfg!(target_os = "linux") {
            return Err(AgentError::CollectorUnavailable("cpu"));
        }

        let content =
            std::fs::read_to_string("/proc/stat").map_err(|e| AgentError::CollectionFailed {
                collector: "cpu",
                message: format!("failed to read /proc/stat: {e}"),
            })?;
        let curr = Self::parse_aggregate(&content)?;

        let usage = match self.prev {
            Some(prev) => Self::usage_percent(&prev, &curr),
            None => 0.0,
        };
        self.prev = Some(curr);

        Ok(CpuSample {
            usage_percent: usage,
            count: self.core_count,
            load_average: Self::read_load_average(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_line() {
        let line = "cpu  100 10 50 800 20 5 5 10 0 0";
        let times = CpuCollector::parse_cpu_line(line).unwrap();

        assert_eq!(times.user, 100);
        assert_eq!(times.nice, 10);
        assert_eq!(times.system, 50);
        assert_eq!(times.idle, 800);
        assert_eq!(times.iowait, 20);
        assert_eq!(times.steal, 10);
        assert_eq!(times.total(), 1000);
        assert_eq!(times.idle_time(), 820);
    }

    #[test]
    fn test_parse_cpu_line_short_is_error() {
        assert!(CpuCollector::parse_cpu_line("cpu 1 2 3").is_err());
    }

    #[test]
    fn test_parse_aggregate_skips_core_lines() {
        let content = "cpu  10 0 10 80 0 0 0 0\ncpu0 5 0 5 40 0 0 0 0\n";
        let times = CpuCollector::parse_aggregate(content).unwrap();
        assert_eq!(times.user, 10);
    }

    #[test]
    fn test_parse_aggregate_missing_line() {
        assert!(CpuCollector::parse_aggregate("intr 0 0 0\n").is_err());
    }

    #[test]
    fn test_usage_percent_from_delta() {
        let prev = CpuTimes { user: 100, idle: 900, ..Default::default() };
        let curr = CpuTimes { user: 200, idle: 1800, ..Default::default() };

        // 100 busy out of 1000 total delta.
        let usage = CpuCollector::usage_percent(&prev, &curr);
        assert!((usage - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_usage_percent_zero_delta() {
        let times = CpuTimes { user: 100, idle: 900, ..Default::default() };
        assert_eq!(CpuCollector::usage_percent(&times, &times), 0.0);
    }

    #[test]
    fn test_usage_percent_fully_busy() {
        let prev = CpuTimes { idle: 1000, ..Default::default() };
        let curr = CpuTimes { user: 500, system: 500, idle: 1000, ..Default::default() };

        let usage = CpuCollector::usage_percent(&prev, &curr);
        assert!((usage - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_usage_percent_counter_wrap_does_not_panic() {
        // A rebooted counter set smaller than prev saturates to zero.
        let prev = CpuTimes { user: 1000, idle: 9000, ..Default::default() };
        let curr = CpuTimes { user: 10, idle: 90, ..Default::default() };

        assert_eq!(CpuCollector::usage_percent(&prev, &curr), 0.0);
    }

    #[test]
    fn test_parse_loadavg() {
        let load = CpuCollector::parse_loadavg("0.52 1.04 2.08 2/1234 5678\n").unwrap();

        assert_eq!(load.one, 0.52);
        assert_eq!(load.five, 1.04);
        assert_eq!(load.fifteen, 2.08);
    }

    #[test]
    fn test_parse_loadavg_garbage() {
        assert!(CpuCollector::parse_loadavg("not a loadavg").is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_first_cycle_reports_zero_usage() {
        let mut collector = CpuCollector::new();
        let sample = collector.collect().unwrap();

        assert_eq!(sample.usage_percent, 0.0);
        assert!(sample.count >= 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_second_cycle_reports_bounded_usage() {
        let mut collector = CpuCollector::new();
        let _ = collector.collect().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        let sample = collector.collect().unwrap();

        assert!(sample.usage_percent >= 0.0);
        assert!(sample.usage_percent <= 100.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_is_available_on_linux() {
        assert!(CpuCollector::new().is_available());
    }
}
