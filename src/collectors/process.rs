//! Process count collector.
//!
//! Counts processes (numeric `/proc` entries) and their threads (the
//! `num_threads` field of `/proc/<pid>/stat`). Processes that exit
//! between the directory scan and the stat read are silently skipped.

use super::Collector;
use crate::error::{AgentError, Result};
use crate::metrics::ProcessSample;

/// Position of `num_threads` among the fields after the command name.
/// `/proc/<pid>/stat` field 20 overall; the command name can contain
/// spaces and parentheses, so counting starts after the last `)`.
const NUM_THREADS_INDEX: usize = 17;

/// Collector for process and thread counts.
#[derive(Debug, Default)]
pub struct ProcessCollector;

impl ProcessCollector {
    /// Creates a new process collector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Extracts the thread count from /proc/<pid>/stat content.
    fn parse_stat_threads(stat: &str) -> Option<u64> {
        let after_comm = &stat[stat.rfind(')')? + 1..];
        after_comm
            .split_whitespace()
            .nth(NUM_THREADS_INDEX)
            .and_then(|s| s.parse().ok())
    }
}

impl Collector for ProcessCollector {
    type Sample = ProcessSample;

    fn id(&self) -> &'static str {
        "processes"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && std::path::Path::new("/proc").exists()
    }

    fn collect(&mut self) -> Result<Self::Sample> {
        if !cfg!(target_os = "linux") {
            return Err(AgentError::CollectorUnavailable("processes"));
        }

        let proc_dir = std::fs::read_dir("/proc").map_err(|e| AgentError::CollectionFailed {
            collector: "processes",
            message: format!("failed to read /proc: {e}"),
        })?;

        let mut count = 0u64;
        let mut thread_count = 0u64;

        for entry in proc_dir.flatten() {
            let name = entry.file_name();
            let Ok(pid) = name.to_string_lossy().parse::<u32>() else {
                continue;
            };

            count += 1;

            // The process may be gone by now; count it without threads.
            if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                thread_count += Self::parse_stat_threads(&stat).unwrap_or(0);
            }
        }

        Ok(ProcessSample { count, thread_count })
    }
}
