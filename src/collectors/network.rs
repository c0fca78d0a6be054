//! Network metrics collector.
//!
//! Parses `/proc/net/dev` and reports per-interface counters plus
//! bandwidth computed from the delta between cycles. Loopback
//! interfaces are skipped.

use super::{round2, Collector};
use crate::error::{AgentError, Result};
use crate::metrics::InterfaceSample;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

/// Cumulative counters for one interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct NetCounters {
    rx_bytes: u64,
    rx_packets: u64,
    rx_errors: u64,
    rx_drops: u64,
    tx_bytes: u64,
    tx_packets: u64,
    tx_errors: u64,
    tx_drops: u64,
}

/// Collector for per-interface network traffic.
#[derive(Debug, Default)]
pub struct NetworkCollector {
    prev: Option<(Instant, BTreeMap<String, NetCounters>)>,
}

impl NetworkCollector {
    /// Creates a new network collector.
    #[must_use]
    pub fn new() -> Self {
        Self { prev: None }
    }

    /// Parses /proc/net/dev content. The two header lines are skipped;
    /// loopback interfaces are dropped.
    fn parse_net_dev(content: &str) -> BTreeMap<String, NetCounters> {
        let mut counters = BTreeMap::new();

        for line in content.lines().skip(2) {
            let Some((name, rest)) = line.split_once(':') else {
                continue;
            };

            let name = name.trim();
            if name.starts_with("lo") {
                continue;
            }

            let values: Vec<u64> = rest
                .split_whitespace()
                .map(|s| s.parse().unwrap_or(0))
                .collect();
            if values.len() < 16 {
                continue;
            }

            // rx: bytes packets errs drop fifo frame compressed multicast
            // tx: bytes packets errs drop ...
            counters.insert(
                name.to_string(),
                NetCounters {
                    rx_bytes: values[0],
                    rx_packets: values[1],
                    rx_errors: values[2],
                    rx_drops: values[3],
                    tx_bytes: values[8],
                    tx_packets: values[9],
                    tx_errors: values[10],
                    tx_drops: values[11],
                },
            );
        }

        counters
    }

    /// Builds samples; rates come from the delta to `prev`, zero for
    /// interfaces seen for the first time.
    fn build_samples(
        prev: &BTreeMap<String, NetCounters>,
        curr: &BTreeMap<String, NetCounters>,
        elapsed_secs: f64,
    ) -> BTreeMap<String, InterfaceSample> {
        let mut samples = BTreeMap::new();

        for (name, current) in curr {
            let mut sample = InterfaceSample {
                bytes_sent: current.tx_bytes,
                bytes_recv: current.rx_bytes,
                packets_sent: current.tx_packets,
                packets_recv: current.rx_packets,
                errin: current.rx_errors,
                errout: current.tx_errors,
                dropin: current.rx_drops,
                dropout: current.tx_drops,
                ..InterfaceSample::default()
            };

            if let Some(previous) = prev.get(name) {
                if elapsed_secs > 0.0 {
                    let tx_delta = current.tx_bytes.saturating_sub(previous.tx_bytes);
                    let rx_delta = current.rx_bytes.saturating_sub(previous.rx_bytes);
                    let tx_pkt_delta =
                        current.tx_packets.saturating_sub(previous.tx_packets);
                    let rx_pkt_delta =
                        current.rx_packets.saturating_sub(previous.rx_packets);

                    sample.bytes_sent_per_sec = (tx_delta as f64 / elapsed_secs) as u64;
                    sample.bytes_recv_per_sec = (rx_delta as f64 / elapsed_secs) as u64;
                    sample.packets_sent_per_sec = round2(tx_pkt_delta as f64 / elapsed_secs);
                    sample.packets_recv_per_sec = round2(rx_pkt_delta as f64 / elapsed_secs);
                }
            }

            samples.insert(name.clone(), sample);
        }

        samples
    }
}

impl Collector for NetworkCollector {
    type Sample = BTreeMap<String, InterfaceSample>;

    fn id(&self) -> &'static str {
        "network"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && std::path::Path::new("/proc/net/dev").exists()
    }

    fn collect(&mut self) -> Result<Self::Sample> {
        if !cfg!(target_os = "linux") {
            return Err(AgentError::CollectorUnavailable("network"));
        }

        let content = std::fs::read_to_string("/proc/net/dev").map_err(|e| {
            AgentError::CollectionFailed {
                collector: "network",
                message: format!("failed to read /proc/net/dev: {e}"),
            }
        })?;

        let now = Instant::now();
        let curr = Self::parse_net_dev(&content);
        debug!(interfaces = curr.len(), "parsed network interfaces");

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

#[cfg(test)]
mod tests {
    use super::*;

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1000000    5000    0    0    0     0          0         0  1000000    5000    0    0    0     0       0          0
  eth0: 9000000   10000    2    1    0     0          0         0  4000000    8000    3    2    0     0       0          0
 wlan0:  500000    1000    0    0    0     0          0         0   250000     800    0    0    0     0       0          0
";

    fn counters(rx_bytes: u64, tx_bytes: u64, rx_packets: u64, tx_packets: u64) -> NetCounters {
        NetCounters {
            rx_bytes,
            rx_packets,
            tx_bytes,
            tx_packets,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_net_dev_skips_loopback() {
        let parsed = NetworkCollector::parse_net_dev(NET_DEV);

        assert!(!parsed.contains_key("lo"));
        assert!(parsed.contains_key("eth0"));
        assert!(parsed.contains_key("wlan0"));
    }

    #[test]
    fn test_parse_net_dev_counters() {
        let parsed = NetworkCollector::parse_net_dev(NET_DEV);
        let eth0 = &parsed["eth0"];

        assert_eq!(eth0.rx_bytes, 9_000_000);
        assert_eq!(eth0.rx_packets, 10_000);
        assert_eq!(eth0.rx_errors, 2);
        assert_eq!(eth0.rx_drops, 1);
        assert_eq!(eth0.tx_bytes, 4_000_000);
        assert_eq!(eth0.tx_packets, 8_000);
        assert_eq!(eth0.tx_errors, 3);
        assert_eq!(eth0.tx_drops, 2);
    }

    #[test]
    fn test_parse_net_dev_empty() {
        assert!(NetworkCollector::parse_net_dev("").is_empty());
    }

    #[test]
    fn test_first_cycle_zero_rates() {
        let curr = NetworkCollector::parse_net_dev(NET_DEV);
        let samples = NetworkCollector::build_samples(&BTreeMap::new(), &curr, 0.0);
        let eth0 = &samples["eth0"];

        assert_eq!(eth0.bytes_sent_per_sec, 0);
        assert_eq!(eth0.packets_recv_per_sec, 0.0);
        // Absolute counters are reported from the start.
        assert_eq!(eth0.bytes_recv, 9_000_000);
        assert_eq!(eth0.errin, 2);
    }

    #[test]
    fn test_rates_from_delta() {
        let prev = BTreeMap::from([("eth0".to_string(), counters(1000, 500, 100, 50))]);
        let curr = BTreeMap::from([("eth0".to_string(), counters(3000, 1500, 300, 150))]);

        let samples = NetworkCollector::build_samples(&prev, &curr, 2.0);
        let eth0 = &samples["eth0"];

        assert_eq!(eth0.bytes_recv_per_sec, 1000);
        assert_eq!(eth0.bytes_sent_per_sec, 500);
        assert_eq!(eth0.packets_recv_per_sec, 100.0);
        assert_eq!(eth0.packets_sent_per_sec, 50.0);
    }

    #[test]
    fn test_packet_rate_rounding() {
        let prev = BTreeMap::from([("eth0".to_string(), counters(0, 0, 0, 0))]);
        let curr = BTreeMap::from([("eth0".to_string(), counters(0, 0, 10, 10))]);

        let samples = NetworkCollector::build_samples(&prev, &curr, 3.0);
        // 10 / 3 = 3.3333... rounded to two decimals.
        assert_eq!(samples["eth0"].packets_recv_per_sec, 3.33);
    }

    #[test]
    fn test_counter_wrap_saturates() {
        let prev = BTreeMap::from([("eth0".to_string(), counters(u64::MAX - 10, 0, 0, 0))]);
        let curr = BTreeMap::from([("eth0".to_string(), counters(100, 0, 0, 0))]);

        let samples = NetworkCollector::build_samples(&prev, &curr, 1.0);
        assert_eq!(samples["eth0"].bytes_recv_per_sec, 0);
    }

    #[test]
    fn test_interface_appearing_mid_run() {
        let prev = BTreeMap::from([("eth0".to_string(), counters(1, 1, 1, 1))]);
        let curr = BTreeMap::from([
            ("eth0".to_string(), counters(2, 2, 2, 2)),
            ("eth1".to_string(), counters(9, 9, 9, 9)),
        ]);

        let samples = NetworkCollector::build_samples(&prev, &curr, 1.0);
        assert_eq!(samples["eth1"].bytes_recv_per_sec, 0);
        assert_eq!(samples["eth1"].bytes_recv, 9);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_collect_on_linux() {
        let mut collector = NetworkCollector::new();
        // May legitimately be empty in minimal containers; must not error.
        let samples = collector.collect().unwrap();
        assert!(!samples.contains_key("lo"));
    }
}
