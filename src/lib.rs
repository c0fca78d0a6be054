//! UptimeSquirrel system monitoring agent.
//!
//! Collects host metrics (CPU, memory, disks, network, service health,
//! temperatures, process counts) once per interval, evaluates alert
//! thresholds, and reports to the UptimeSquirrel API. API outages are
//! absorbed by a bounded offline buffer; alert thresholds can be pushed
//! from the server and override local configuration.
//!
//! The `uptimesquirrel-agent` binary is a thin CLI over [`agent::Agent`]:
//!
//! ```text
//! uptimesquirrel-agent -c /etc/uptimesquirrel/agent.conf   # run forever
//! uptimesquirrel-agent --test                              # one cycle
//! uptimesquirrel-agent --status                            # show thresholds
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

// ============================================================================
// Errors
// ============================================================================

pub mod error;
pub use error::{AgentError, Result};

// ============================================================================
// Configuration
// ============================================================================

pub mod config;
pub use config::AgentConfig;

// ============================================================================
// Core building blocks
// ============================================================================

pub mod buffer;
pub mod metrics;
pub mod subprocess;
pub mod thresholds;

pub use buffer::MetricBuffer;
pub use metrics::MetricsSnapshot;
pub use thresholds::ThresholdManager;

// ============================================================================
// Collectors
// ============================================================================

pub mod collectors;
pub use collectors::{Collector, SystemCollectors};

// ============================================================================
// API client and agent
// ============================================================================

pub mod agent;
pub mod client;

pub use agent::Agent;
pub use client::ApiClient;
