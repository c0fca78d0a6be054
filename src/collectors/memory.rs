//! Memory metrics collector.
//!
//! Parses `/proc/meminfo`. Sizes are reported in bytes; "used" means
//! `total - available`, the figure that matters for alerting.

use super::Collector;
use crate::error::{AgentError, Result};
use crate::metrics::{MemorySample, SwapSample};

/// Collector for memory and swap usage.
#[derive(Debug, Default)]
pub struct MemoryCollector {
    /// Total memory cached for the registration payload.
    total: u64,
}

impl MemoryCollector {
    /// Creates a new memory collector.
    #[must_use]
    pub fn new() -> Self {
        let total = Self::read()
            .map(|sample| sample.total)
            .unwrap_or(0);
        Self { total }
    }

    /// Total physical memory in bytes (0 if unknown).
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    fn read() -> Result<MemorySample> {
        #[cfg(target_os = "linux")]
        {
            let content = std::fs::read_to_string("/proc/meminfo").map_err(|e| {
                AgentError::CollectionFailed {
                    collector: "memory",
                    message: format!("failed to read /proc/meminfo: {e}"),
                }
            })?;
            Ok(Self::parse_meminfo(&content))
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(AgentError::CollectorUnavailable("memory"))
        }
    }

    /// Parses /proc/meminfo content. Values are kB on the wire there;
    /// we convert to bytes.
    fn parse_meminfo(content: &str) -> MemorySample {
        let mut total = 0u64;
        let mut free = 0u64;
        let mut available = 0u64;
        let mut swap_total = 0u64;
        let mut swap_free = 0u64;

        for line in content.lines() {
            let mut parts = line.split_whitespace();
            let Some(key) = parts.next() else { continue };
            let value: u64 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0)
                * 1024;

            match key {
                "MemTotal:" => total = value,
                "MemFree:" => free = value,
                "MemAvailable:" => available = value,
                "SwapTotal:" => swap_total = value,
                "SwapFree:" => swap_free = value,
                _ => {}
            }
        }

        let used = total.saturating_sub(available);
        let swap_used = swap_total.saturating_sub(swap_free);

        let percent = if total > 0 {
            (used as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let swap_percent = if swap_total > 0 {
            (swap_used as f64 / swap_total as f64) * 100.0
        } else {
            0.0
        };

        MemorySample {
            total,
            available,
            used,
            free,
            percent,
            swap: SwapSample {
                total: swap_total,
                used: swap_used,
                free: swap_free,
                percent: swap_percent,
            },
        }
    }
}

impl Collector for MemoryCollector {
    type Sample = MemorySample;

    fn id(&self) -> &'static str {
        "memory"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && std::path::Path::new("/proc/meminfo").exists()
    }

    fn collect(&mut self) -> Result<Self::Sample> {
        let sample = Self::read()?;
        self.total = sample.total;
        Ok(sample)
    }
}
