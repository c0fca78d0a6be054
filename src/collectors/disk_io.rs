//! Disk I/O collector.
//!
//! Parses `/proc/diskstats` and reports per-device throughput and IOPS
//! from the delta between cycles. Partitions are excluded; the whole
//! disk already carries their traffic.

use super::{round2, Collector};
use crate::error::{AgentError, Result};
use crate::metrics::DiskIoSample;
use std::collections::BTreeMap;
use std::time::Instant;

/// Sector counts in /proc/diskstats are in 512-byte units regardless
/// of the device's physical sector size.
const SECTOR_SIZE: u64 = 512;

/// Cumulative counters for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct IoCounters {
    reads_completed: u64,
    sectors_read: u64,
    writes_completed: u64,
    sectors_written: u64,
}

impl IoCounters {
    fn read_bytes(&self) -> u64 {
        self.sectors_read * SECTOR_SIZE
    }

    fn write_bytes(&self) -> u64 {
        self.sectors_written * SECTOR_SIZE
    }
}

/// Collector for disk I/O rates.
#[derive(Debug, Default)]
pub struct DiskIoCollector {
    prev: Option<(Instant, BTreeMap<String, IoCounters>)>,
}

impl DiskIoCollector {
    /// Creates a new disk I/O collector.
    #[must_use]
    pub fn new() -> Self {
        Self { prev: None }
    }

    /// Parses /proc/diskstats content into per-device counters,
    /// excluding partitions.
    fn parse_diskstats(content: &str) -> BTreeMap<String, IoCounters> {
        let mut counters = BTreeMap::new();

        for line in content.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 14 {
                continue;
            }

            let name = fields[2];
            if is_partition(name) {
                continue;
            }

            let field = |i: usize| fields.get(i).and_then(|s| s.parse().ok()).unwrap_or(0);

            counters.insert(
                name.to_string(),
                IoCounters {
                    reads_completed: field(3),
                    sectors_read: field(5),
                    writes_completed: field(7),
                    sectors_written: field(9),
                },
            );
        }

        counters
    }

    /// Builds samples from the delta between two counter sets.
    fn build_samples(
        prev: &BTreeMap<String, IoCounters>,
        curr: &BTreeMap<String, IoCounters>,
        elapsed_secs: f64,
    ) -> BTreeMap<String, DiskIoSample> {
        let mut samples = BTreeMap::new();

        for (name, current) in curr {
            let sample = match prev.get(name) {
                Some(previous) if elapsed_secs > 0.0 => {
                    let read_bytes_delta =
                        current.read_bytes().saturating_sub(previous.read_bytes());
                    let write_bytes_delta =
                        current.write_bytes().saturating_sub(previous.write_bytes());
                    let read_ops_delta =
                        current.reads_completed.saturating_sub(previous.reads_completed);
                    let write_ops_delta =
                        current.writes_completed.saturating_sub(previous.writes_completed);

                    DiskIoSample {
                        read_bytes_per_sec: (read_bytes_delta as f64 / elapsed_secs) as u64,
                        write_bytes_per_sec: (write_bytes_delta as f64 / elapsed_secs) as u64,
                        read_iops: round2(read_ops_delta as f64 / elapsed_secs),
                        write_iops: round2(write_ops_delta as f64 / elapsed_secs),
                        read_count: current.reads_completed,
                        write_count: current.writes_completed,
                        read_bytes: current.read_bytes(),
                        write_bytes: current.write_bytes(),
                    }
                }
                // First sight of this device: absolute counters, no rates.
                _ => DiskIoSample {
                    read_count: current.reads_completed,
                    write_count: current.writes_completed,
                    read_bytes: current.read_bytes(),
                    write_bytes: current.write_bytes(),
                    ..DiskIoSample::default()
                },
            };

            samples.insert(name.clone(), sample);
        }

        samples
    }
}

impl Collector for DiskIoCollector {
    type Sample = BTreeMap<String, DiskIoSample>;

    fn id(&self) -> &'static str {
        "disk_io"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && std::path::Path::new("/proc/diskstats").exists()
    }

    fn collect(&mut self) -> Result<Self::Sample> {
        if !cfg!(target_os = "linux") {
            return Err(AgentError::CollectorUnavailable("disk_io"));
        }

        let content = std::fs::read_to_string("/proc/diskstats").map_err(|e| {
            AgentError::CollectionFailed {
                collector: "disk_io",
                message: format!("failed to read /proc/diskstats: {e}"),
            }
        })?;

        let now = Instant::now();
        let curr = Self::parse_diskstats(&content);

        let samples = match &self.prev {
            Some((prev_time, prev)) => {
                Self::build_samples(prev, &curr, now.duration_since(*prev_time).as_secs_f64())
            }
            None => Self::build_samples(&BTreeMap::new(), &curr, 0.0),
        };

        self.prev = Some((now, curr));
        Ok(samples)
    }
}

/// True for partition entries like `sda1` or `nvme0n1p2`.
fn is_partition(name: &str) -> bool {
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        // Namespace/card devices end in a digit too; partitions carry a
        // `p<digit>` suffix.
        return name
            .rsplit_once('p')
            .is_some_and(|(prefix, suffix)| {
                !suffix.is_empty()
                    && suffix.chars().all(|c| c.is_ascii_digit())
                    && prefix.ends_with(|c: char| c.is_ascii_digit())
            });
    }

    (name.starts_with("sd") || name.starts_with("hd") || name.starts_with("vd")
        || name.starts_with("xvd"))
        && name.ends_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISKSTATS: &str = "\
   8       0 sda 1000 0 80000 500 2000 0 160000 900 0 700 1400 0 0 0 0
   8       1 sda1 900 0 70000 450 1900 0 150000 850 0 650 1300 0 0 0 0
 259       0 nvme0n1 5000 0 400000 100 3000 0 240000 200 0 250 300 0 0 0 0
 259       1 nvme0n1p1 4000 0 300000 90 2500 0 200000 180 0 200 270 0 0 0 0
   7       0 loop0 10 0 100 0 0 0 0 0 0 0 0 0 0 0 0
";

    #[test]
    fn test_is_partition() {
        assert!(is_partition("sda1"));
        assert!(is_partition("vdb2"));
        assert!(is_partition("xvda1"));
        assert!(is_partition("nvme0n1p1"));
        assert!(is_partition("mmcblk0p2"));

        assert!(!is_partition("sda"));
        assert!(!is_partition("nvme0n1"));
        assert!(!is_partition("mmcblk0"));
        assert!(!is_partition("loop0"));
        assert!(!is_partition("dm-0"));
        assert!(!is_partition("md0"));
        assert!(!is_partition("sr0"));
    }

    #[test]
    fn test_parse_diskstats_excludes_partitions() {
        let counters = DiskIoCollector::parse_diskstats(DISKSTATS);

        assert!(counters.contains_key("sda"));
        assert!(counters.contains_key("nvme0n1"));
        assert!(counters.contains_key("loop0"));
        assert!(!counters.contains_key("sda1"));
        assert!(!counters.contains_key("nvme0n1p1"));
    }

    #[test]
    fn test_parse_diskstats_counters() {
        let counters = DiskIoCollector::parse_diskstats(DISKSTATS);
        let sda = &counters["sda"];

        assert_eq!(sda.reads_completed, 1000);
        assert_eq!(sda.sectors_read, 80000);
        assert_eq!(sda.writes_completed, 2000);
        assert_eq!(sda.sectors_written, 160_000);
        assert_eq!(sda.read_bytes(), 80000 * 512);
    }

    #[test]
    fn test_parse_diskstats_short_lines_ignored() {
        assert!(DiskIoCollector::parse_diskstats("8 0 sda 1 2 3\n").is_empty());
    }

    #[test]
    fn test_first_cycle_zero_rates() {
        let curr = DiskIoCollector::parse_diskstats(DISKSTATS);
        let samples = DiskIoCollector::build_samples(&BTreeMap::new(), &curr, 0.0);

        let sda = &samples["sda"];
        assert_eq!(sda.read_bytes_per_sec, 0);
        assert_eq!(sda.write_iops, 0.0);
        // Absolute counters are still reported.
        assert_eq!(sda.read_count, 1000);
        assert_eq!(sda.read_bytes, 80000 * 512);
    }

    #[test]
    fn test_rates_from_delta() {
        let prev = BTreeMap::from([(
            "sda".to_string(),
            IoCounters {
                reads_completed: 1000,
                sectors_read: 80000,
                writes_completed: 2000,
                sectors_written: 160_000,
            },
        )]);
        let curr = BTreeMap::from([(
            "sda".to_string(),
            IoCounters {
                reads_completed: 1100,
                sectors_read: 82000,
                writes_completed: 2050,
                sectors_written: 161_000,
            },
        )]);

        let samples = DiskIoCollector::build_samples(&prev, &curr, 2.0);
        let sda = &samples["sda"];

        // 2000 sectors * 512 bytes over 2 seconds.
        assert_eq!(sda.read_bytes_per_sec, 512_000);
        assert_eq!(sda.write_bytes_per_sec, 256_000);
        assert_eq!(sda.read_iops, 50.0);
        assert_eq!(sda.write_iops, 25.0);
        assert_eq!(sda.read_count, 1100);
    }

    #[test]
    fn test_counter_wrap_saturates_to_zero() {
        let prev = BTreeMap::from([(
            "sda".to_string(),
            IoCounters { reads_completed: 5000, sectors_read: 900_000, ..Default::default() },
        )]);
        let curr = BTreeMap::from([(
            "sda".to_string(),
            IoCounters { reads_completed: 10, sectors_read: 100, ..Default::default() },
        )]);

        let samples = DiskIoCollector::build_samples(&prev, &curr, 1.0);
        assert_eq!(samples["sda"].read_bytes_per_sec, 0);
        assert_eq!(samples["sda"].read_iops, 0.0);
    }

    #[test]
    fn test_new_device_mid_run_gets_zero_rates() {
        let prev = BTreeMap::new();
        let curr = BTreeMap::from([(
            "sdb".to_string(),
            IoCounters { reads_completed: 7, sectors_read: 56, ..Default::default() },
        )]);

        let samples = DiskIoCollector::build_samples(&prev, &curr, 1.0);
        assert_eq!(samples["sdb"].read_bytes_per_sec, 0);
        assert_eq!(samples["sdb"].read_count, 7);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_collect_on_linux() {
        let mut collector = DiskIoCollector::new();
        let first = collector.collect().unwrap();

        for sample in first.values() {
            assert_eq!(sample.read_bytes_per_sec, 0);
        }
    }
}
