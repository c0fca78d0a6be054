//! Agent configuration.
//!
//! Loads the INI-style `agent.conf` used by deployed agents. A missing
//! file is not an error: built-in defaults apply, matching a fresh
//! install before the key is filled in.
//!
//! ```ini
//! [api]
//! url = https://agent-api.uptimesquirrel.com
//! key = YOUR_AGENT_KEY_HERE
//!
//! [monitoring]
//! interval = 60
//! cpu_threshold = 80.0
//!
//! [services]
//! monitor_nginx = true
//! monitor_docker-registry = true
//! ```

use crate::error::{AgentError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default API endpoint.
pub const DEFAULT_API_URL: &str = "https://agent-api.uptimesquirrel.com";

/// Default reporting interval in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Default CPU usage alert threshold (percent).
pub const DEFAULT_CPU_THRESHOLD: f64 = 80.0;

/// Default memory usage alert threshold (percent).
pub const DEFAULT_MEMORY_THRESHOLD: f64 = 85.0;

/// Default disk usage alert threshold (percent).
pub const DEFAULT_DISK_THRESHOLD: f64 = 90.0;

/// Default config directory; also holds `disks.json`.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/uptimesquirrel";

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/uptimesquirrel/agent.conf";

/// Parsed INI document: section name -> key -> value.
///
/// Keys are lowercased on parse; section names keep their case. The
/// last occurrence of a duplicated key wins.
type IniSections = BTreeMap<String, BTreeMap<String, String>>;

/// Parses INI text into sections.
///
/// Supports `#` and `;` comment lines and both `=` and `:` separators.
///
/// # Errors
///
/// Returns [`AgentError::ConfigParse`] with a 1-indexed line number for
/// keys outside any section or lines that are neither a section header
/// nor a key/value pair.
fn parse_ini(text: &str) -> Result<IniSections> {
    let mut sections = IniSections::new();
    let mut current: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        let lineno = idx + 1;

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[') {
            let Some(name) = name.strip_suffix(']') else {
                return Err(AgentError::ConfigParse {
                    line: lineno,
                    message: format!("unterminated section header: {line}"),
                });
            };
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        let sep = line.find(['=', ':']).ok_or_else(|| AgentError::ConfigParse {
            line: lineno,
            message: format!("expected 'key = value', got: {line}"),
        })?;

        let key = line[..sep].trim().to_lowercase();
        let value = line[sep + 1..].trim().to_string();

        if key.is_empty() {
            return Err(AgentError::ConfigParse {
                line: lineno,
                message: "empty key".to_string(),
            });
        }

        let Some(section) = &current else {
            return Err(AgentError::ConfigParse {
                line: lineno,
                message: format!("key '{key}' appears before any [section] header"),
            });
        };

        sections
            .entry(section.clone())
            .or_default()
            .insert(key, value);
    }

    Ok(sections)
}

/// API connection settings (`[api]` section).
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the agent API.
    pub url: String,
    /// Agent key, sent as the `X-Agent-Key` header. Empty until the
    /// operator fills it in.
    pub key: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { url: DEFAULT_API_URL.to_string(), key: String::new() }
    }
}

/// Monitoring settings (`[monitoring]` section).
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Reporting interval in seconds.
    pub interval_secs: u64,
    /// CPU usage alert threshold (percent).
    pub cpu_threshold: f64,
    /// Memory usage alert threshold (percent).
    pub memory_threshold: f64,
    /// Disk usage alert threshold (percent).
    pub disk_threshold: f64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            cpu_threshold: DEFAULT_CPU_THRESHOLD,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            disk_threshold: DEFAULT_DISK_THRESHOLD,
        }
    }
}

/// Complete agent configuration.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    /// API connection settings.
    pub api: ApiConfig,
    /// Monitoring intervals and thresholds.
    pub monitoring: MonitoringConfig,
    /// Services to monitor, from `monitor_<name> = true` keys.
    pub services: Vec<String>,
}

impl AgentConfig {
    /// Loads configuration from a file, falling back to defaults when
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses configuration from INI text.
    ///
    /// Unknown sections and keys are ignored so newer server-side
    /// options do not break older agents.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed INI or non-numeric values in
    /// numeric keys.
    pub fn parse(text: &str) -> Result<Self> {
        let sections = parse_ini(text)?;
        let mut config = Self::default();

        if let Some(api) = sections.get("api") {
            if let Some(url) = api.get("url") {
                if !url.is_empty() {
                    config.api.url = url.trim_end_matches('/').to_string();
                }
            }
            if let Some(key) = api.get("key") {
                config.api.key = key.clone();
            }
        }

        if let Some(monitoring) = sections.get("monitoring") {
            config.monitoring.interval_secs =
                get_u64(monitoring, "monitoring", "interval", DEFAULT_INTERVAL_SECS)?;
            config.monitoring.cpu_threshold =
                get_f64(monitoring, "monitoring", "cpu_threshold", DEFAULT_CPU_THRESHOLD)?;
            config.monitoring.memory_threshold =
                get_f64(monitoring, "monitoring", "memory_threshold", DEFAULT_MEMORY_THRESHOLD)?;
            config.monitoring.disk_threshold =
                get_f64(monitoring, "monitoring", "disk_threshold", DEFAULT_DISK_THRESHOLD)?;
        }

        if let Some(services) = sections.get("services") {
            for (key, value) in services {
                if let Some(name) = key.strip_prefix("monitor_") {
                    if value.eq_ignore_ascii_case("true") && !name.is_empty() {
                        config.services.push(name.to_string());
                    }
                }
            }
        }

        Ok(config)
    }

    /// Returns the reporting interval as a [`Duration`].
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.monitoring.interval_secs)
    }
}

fn get_u64(
    section: &BTreeMap<String, String>,
    section_name: &str,
    key: &str,
    default: u64,
) -> Result<u64> {
    match section.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| AgentError::ConfigInvalid {
            key: format!("{section_name}.{key}"),
            message: format!("expected an integer, got '{raw}'"),
        }),
    }
}

fn get_f64(
    section: &BTreeMap<String, String>,
    section_name: &str,
    key: &str,
    default: f64,
) -> Result<f64> {
    match section.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| AgentError::ConfigInvalid {
            key: format!("{section_name}.{key}"),
            message: format!("expected a number, got '{raw}'"),
        }),
    }
}
