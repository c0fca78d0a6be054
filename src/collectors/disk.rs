//! Disk usage collector.
//!
//! Enumerates mounted real filesystems from `/proc/mounts` and sizes
//! them via `df`. Which mounts are reported is governed by a
//! `disks.json` file next to the agent config: on first run the
//! collector discovers mounts and writes a default config enabling all
//! of them, and operators flip `enabled` flags to hide mounts. The
//! file is re-read at most once a minute so edits apply without a
//! restart.

use super::Collector;
use crate::error::{AgentError, Result};
use crate::metrics::DiskUsageSample;
#[cfg(target_os = "linux")]
use crate::subprocess::run_with_timeout;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// File name of the disk monitoring config, inside the agent config dir.
pub const DISK_CONFIG_FILE: &str = "disks.json";

/// How often the config file is re-read.
const CONFIG_RELOAD_INTERVAL: Duration = Duration::from_secs(60);

/// Mounts smaller than this are left out of the generated default
/// config (boot partitions, squashfs snaps).
const MIN_MONITORED_BYTES: u64 = 1024 * 1024 * 1024;

fn default_true() -> bool {
    true
}

/// Per-mount monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskEntry {
    /// Whether this mount is reported.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Device path, informational.
    #[serde(default)]
    pub device: String,
    /// Filesystem type, informational.
    #[serde(default)]
    pub fstype: String,
    /// Label shown in the dashboard.
    #[serde(default)]
    pub description: String,
}

/// The disks.json document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskMonitorConfig {
    /// Header comment written into generated configs.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    /// Operator instructions written into generated configs.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instructions: String,
    /// Master switch for disk usage collection.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Per-mount settings, keyed by mountpoint. Mounts without an
    /// entry are reported.
    #[serde(default)]
    pub disks: BTreeMap<String, DiskEntry>,
}

impl Default for DiskMonitorConfig {
    fn default() -> Self {
        Self {
            comment: String::new(),
            instructions: String::new(),
            enabled: true,
            disks: BTreeMap::new(),
        }
    }
}

impl DiskMonitorConfig {
    /// True when the given mount should be reported.
    #[must_use]
    pub fn mount_enabled(&self, mount_point: &str) -> bool {
        self.disks.get(mount_point).map_or(true, |entry| entry.enabled)
    }
}

/// A mounted filesystem with size information.
#[derive(Debug, Clone)]
struct MountInfo {
    device: String,
    mount_point: String,
    fs_type: String,
    total: u64,
    used: u64,
    available: u64,
}

impl MountInfo {
    fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.used as f64 / self.total as f64) * 100.0
    }
}

/// Collector for per-mount disk usage.
#[derive(Debug)]
pub struct DiskCollector {
    config_path: PathBuf,
    config: DiskMonitorConfig,
    last_reload: Instant,
}

impl DiskCollector {
    /// Creates a disk collector with its config under `config_dir`.
    ///
    /// Writes a default `disks.json` there when none exists.
    #[must_use]
    pub fn new(config_dir: &Path) -> Self {
        let config_path = config_dir.join(DISK_CONFIG_FILE);
        let config = Self::load_or_init(&config_path);
        Self { config_path, config, last_reload: Instant::now() }
    }

    fn load_or_init(path: &Path) -> DiskMonitorConfig {
        if !path.exists() {
            let config = Self::default_config(&read_mounts());
            Self::write_config(path, &config);
            return config;
        }

        match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
        {
            Ok(config) => {
                info!(path = %path.display(), "loaded disk configuration");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable disk config, monitoring all mounts");
                DiskMonitorConfig::default()
            }
        }
    }

    /// Builds the generated default config from discovered mounts.
    fn default_config(mounts: &[MountInfo]) -> DiskMonitorConfig {
        let mut disks = BTreeMap::new();
        for mount in mounts {
            if mount.total < MIN_MONITORED_BYTES {
                continue;
            }
            disks.insert(
                mount.mount_point.clone(),
                DiskEntry {
                    enabled: true,
                    device: mount.device.clone(),
                    fstype: mount.fs_type.clone(),
                    description: format!("{} ({})", mount.device, format_bytes(mount.total)),
                },
            );
        }

        DiskMonitorConfig {
            comment: "Disk monitoring configuration for the UptimeSquirrel agent".to_string(),
            instructions: "Set 'enabled' to false for any disk you don't want to monitor"
                .to_string(),
            enabled: true,
            disks,
        }
    }

    fn write_config(path: &Path, config: &DiskMonitorConfig) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "cannot create config directory");
                return;
            }
        }

        match serde_json::to_string_pretty(config) {
            Ok(json) => match std::fs::write(path, json) {
                Ok(()) => info!(path = %path.display(), "created default disk configuration"),
                Err(e) => warn!(path = %path.display(), error = %e, "cannot write disk config"),
            },
            Err(e) => warn!(error = %e, "cannot serialize disk config"),
        }
    }

    fn maybe_reload(&mut self) {
        if self.last_reload.elapsed() < CONFIG_RELOAD_INTERVAL {
            return;
        }
        self.config = Self::load_or_init(&self.config_path);
        self.last_reload = Instant::now();
    }

    /// Currently mounted paths, for the registration payload.
    #[must_use]
    pub fn mount_points(&self) -> Vec<String> {
        read_mounts().into_iter().map(|m| m.mount_point).collect()
    }
}

impl Collector for DiskCollector {
    type Sample = BTreeMap<String, DiskUsageSample>;

    fn id(&self) -> &'static str {
        "disk"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && std::path::Path::new("/proc/mounts").exists()
    }

    fn collect(&mut self) -> Result<Self::Sample> {
        if !cfg!(target_os = "linux") {
            return Err(AgentError::CollectorUnavailable("disk"));
        }

        self.maybe_reload();

        let mut disks = BTreeMap::new();
        if !self.config.enabled {
            return Ok(disks);
        }

        for mount in read_mounts() {
            if !self.config.mount_enabled(&mount.mount_point) {
                continue;
            }

            let description = self
                .config
                .disks
                .get(&mount.mount_point)
                .map(|entry| entry.description.clone())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| {
                    format!("{} ({})", mount.device, format_bytes(mount.total))
                });

            let percent = mount.percent();
            disks.insert(
                mount.mount_point.clone(),
                DiskUsageSample {
                    device: mount.device,
                    fstype: mount.fs_type,
                    total: mount.total,
                    used: mount.used,
                    free: mount.available,
                    percent,
                    description,
                },
            );
        }

        Ok(disks)
    }
}

/// True for virtual, special, and network mounts we never report.
fn should_skip_mount(device: &str, mount_point: &str, fs_type: &str) -> bool {
    if !device.starts_with('/') {
        return true;
    }

    if mount_point.starts_with("/sys")
        || mount_point.starts_with("/proc")
        || mount_point.starts_with("/dev")
        || mount_point.starts_with("/run")
        || mount_point.starts_with("/snap")
    {
        return true;
    }

    // Network filesystems can hang size queries indefinitely.
    matches!(
        fs_type,
        "nfs" | "nfs4" | "cifs" | "smbfs" | "autofs" | "fuse.sshfs" | "fuse.rclone" | "9p"
    )
}

/// Enumerates mounted real filesystems with sizes.
fn read_mounts() -> Vec<MountInfo> {
    #[cfg(target_os = "linux")]
    {
        let Ok(content) = std::fs::read_to_string("/proc/mounts") else {
            return Vec::new();
        };

        let mut mounts = Vec::new();
        for line in content.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                continue;
            }

            let (device, mount_point, fs_type) = (fields[0], fields[1], fields[2]);
            if should_skip_mount(device, mount_point, fs_type) {
                continue;
            }

            if let Some((total, used, available)) = query_fs_size(mount_point) {
                mounts.push(MountInfo {
                    device: device.to_string(),
                    mount_point: mount_point.to_string(),
                    fs_type: fs_type.to_string(),
                    total,
                    used,
                    available,
                });
            }
        }
        mounts
    }
    #[cfg(not(target_os = "linux"))]
    {
        Vec::new()
    }
}

/// Filesystem size via `df`, under a timeout so one hung mount cannot
/// stall the cycle.
#[cfg(target_os = "linux")]
fn query_fs_size(path: &str) -> Option<(u64, u64, u64)> {
    let result = run_with_timeout(
        "df",
        &["--output=size,used,avail", "-B1", path],
        Duration::from_secs(2),
    );

    if !result.success() {
        return None;
    }
    parse_df_output(&result.stdout_trimmed()?)
}

/// Parses `df --output=size,used,avail -B1` output.
fn parse_df_output(output: &str) -> Option<(u64, u64, u64)> {
    let line = output.lines().nth(1)?;
    let values: Vec<u64> = line
        .split_whitespace()
        .filter_map(|s| s.parse().ok())
        .collect();

    if values.len() < 3 {
        return None;
    }
    Some((values[0], values[1], values[2]))
}

/// Formats a byte count with one decimal, e.g. `42.0 GB`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} PB")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(point: &str, total: u64) -> MountInfo {
        MountInfo {
            device: "/dev/sda1".to_string(),
            mount_point: point.to_string(),
            fs_type: "ext4".to_string(),
            total,
            used: total / 2,
            available: total / 2,
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512.0 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.0 MB");
        assert_eq!(format_bytes(250 * 1024 * 1024 * 1024), "250.0 GB");
        assert_eq!(format_bytes(2 * 1024_u64.pow(4)), "2.0 TB");
    }

    #[test]
    fn test_should_skip_virtual_devices() {
        assert!(should_skip_mount("tmpfs", "/tmp", "tmpfs"));
        assert!(should_skip_mount("proc", "/proc", "proc"));
        assert!(!should_skip_mount("/dev/sda1", "/", "ext4"));
    }

    #[test]
    fn test_should_skip_special_mount_points() {
        assert!(should_skip_mount("/dev/sda1", "/run/lock", "ext4"));
        assert!(should_skip_mount("/dev/loop3", "/snap/core/123", "squashfs"));
        assert!(!should_skip_mount("/dev/sdb1", "/data", "xfs"));
    }

    #[test]
    fn test_should_skip_network_filesystems() {
        assert!(should_skip_mount("/mnt/export", "/mnt/nfs", "nfs4"));
        assert!(should_skip_mount("/share", "/mnt/smb", "cifs"));
    }

    #[test]
    fn test_parse_df_output() {
        let output = " 1B-blocks      Used     Avail\n1000000000 600000000 400000000";
        let (total, used, avail) = parse_df_output(output).unwrap();

        assert_eq!(total, 1_000_000_000);
        assert_eq!(used, 600_000_000);
        assert_eq!(avail, 400_000_000);
    }

    #[test]
    fn test_parse_df_output_garbage() {
        assert!(parse_df_output("").is_none());
        assert!(parse_df_output("header only").is_none());
        assert!(parse_df_output("h\nnot numbers here").is_none());
    }

    #[test]
    fn test_mount_percent() {
        let m = mount("/", 100);
        assert!((m.percent() - 50.0).abs() < 0.01);

        let empty = MountInfo { total: 0, ..mount("/", 0) };
        assert_eq!(empty.percent(), 0.0);
    }

    #[test]
    fn test_default_config_skips_small_mounts() {
        let mounts = vec![
            mount("/", 100 * 1024 * 1024 * 1024),
            mount("/boot/efi", 512 * 1024 * 1024),
        ];
        let config = DiskCollector::default_config(&mounts);

        assert!(config.enabled);
        assert!(config.disks.contains_key("/"));
        assert!(!config.disks.contains_key("/boot/efi"));
        assert!(config.disks["/"].description.contains("/dev/sda1"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = DiskCollector::default_config(&[mount("/", 10 * 1024 * 1024 * 1024)]);
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: DiskMonitorConfig = serde_json::from_str(&json).unwrap();

        assert!(parsed.enabled);
        assert_eq!(parsed.disks.len(), 1);
        assert!(parsed.mount_enabled("/"));
    }

    #[test]
    fn test_mount_enabled_defaults_to_true_for_unknown() {
        let config = DiskMonitorConfig::default();
        assert!(config.mount_enabled("/never-seen"));
    }

    #[test]
    fn test_mount_enabled_respects_flag() {
        let mut config = DiskMonitorConfig::default();
        config.disks.insert(
            "/data".to_string(),
            DiskEntry {
                enabled: false,
                device: String::new(),
                fstype: String::new(),
                description: String::new(),
            },
        );

        assert!(!config.mount_enabled("/data"));
    }

    #[test]
    fn test_parse_config_with_defaults() {
        let parsed: DiskMonitorConfig =
            serde_json::from_str(r#"{"disks": {"/": {"device": "/dev/sda1"}}}"#).unwrap();

        assert!(parsed.enabled);
        assert!(parsed.disks["/"].enabled);
    }

    #[test]
    fn test_new_writes_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let _collector = DiskCollector::new(dir.path());

        let path = dir.path().join(DISK_CONFIG_FILE);
        assert!(path.exists());

        let parsed: DiskMonitorConfig =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert!(parsed.enabled);
    }

    #[test]
    fn test_new_tolerates_corrupt_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DISK_CONFIG_FILE), "{not json").unwrap();

        let collector = DiskCollector::new(dir.path());
        assert!(collector.config.enabled);
        assert!(collector.config.disks.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_collect_respects_master_switch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DISK_CONFIG_FILE),
            r#"{"enabled": false, "disks": {}}"#,
        )
        .unwrap();

        let mut collector = DiskCollector::new(dir.path());
        assert!(collector.collect().unwrap().is_empty());
    }
}
