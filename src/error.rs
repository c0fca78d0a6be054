//! Error types for the monitoring agent.
//!
//! Covers metric collection, configuration parsing, and API transport
//! failures.

use std::io;
use thiserror::Error;

/// Error type for agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A metric collector is not available on this system.
    #[error("collector '{0}' is not available on this system")]
    CollectorUnavailable(&'static str),

    /// Failed to collect metrics from a collector.
    #[error("failed to collect metrics from '{collector}': {message}")]
    CollectionFailed {
        /// The collector that failed.
        collector: &'static str,
        /// Error message describing the failure.
        message: String,
    },

    /// Configuration parsing error with line number.
    #[error("configuration error at line {line}: {message}")]
    ConfigParse {
        /// Line number where the error occurred (1-indexed).
        line: usize,
        /// Error message describing the issue.
        message: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration value for '{key}': {message}")]
    ConfigInvalid {
        /// The configuration key with invalid value.
        key: String,
        /// Error message describing why the value is invalid.
        message: String,
    },

    /// The configured agent key cannot be sent as an HTTP header.
    #[error("invalid agent key: {0}")]
    InvalidAgentKey(String),

    /// HTTP transport error from the API client.
    #[error("API transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an unexpected status code.
    #[error("API error: HTTP {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or status description.
        message: String,
    },

    /// I/O error (config files, /proc reads surfaced as errors).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
