//! Temperature collector.
//!
//! Reads `/sys/class/hwmon/*` and reduces the readings to two numbers:
//! the hottest CPU sensor and the hottest GPU sensor. Chips are matched
//! by their hwmon `name`; when no known CPU chip is present the hottest
//! reading of any chip stands in, which covers boards that only expose
//! an ACPI thermal zone under an unusual name.

use super::Collector;
use crate::error::Result;
use crate::metrics::ThermalSample;
use std::path::{Path, PathBuf};

/// hwmon chip names that report CPU temperatures, in preference order.
const CPU_CHIPS: [&str; 4] = ["coretemp", "cpu_thermal", "k10temp", "acpi"];

/// hwmon chip names that report GPU temperatures, in preference order.
const GPU_CHIPS: [&str; 3] = ["nouveau", "radeon", "amdgpu"];

/// One chip's readings.
#[derive(Debug, Clone)]
struct ChipReadings {
    name: String,
    /// Temperatures in Celsius.
    temps: Vec<f64>,
}

impl ChipReadings {
    fn max_temp(&self) -> Option<f64> {
        self.temps.iter().copied().reduce(f64::max)
    }
}

/// Collector for CPU/GPU temperatures.
#[derive(Debug)]
pub struct ThermalCollector {
    hwmon_root: PathBuf,
}

impl ThermalCollector {
    /// Creates a collector reading from `/sys/class/hwmon`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root("/sys/class/hwmon")
    }

    /// Creates a collector reading from an alternate hwmon tree.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { hwmon_root: root.into() }
    }

    /// Reads every chip under the hwmon root.
    fn read_chips(&self) -> Vec<ChipReadings> {
        let Ok(entries) = std::fs::read_dir(&self.hwmon_root) else {
            return Vec::new();
        };

        let mut chips = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let Some(name) = read_trimmed(&path.join("name")) else {
                continue;
            };

            let temps = read_chip_temps(&path);
            if !temps.is_empty() {
                chips.push(ChipReadings { name, temps });
            }
        }
        chips
    }

    /// Reduces chip readings to the reported sample.
    fn summarize(chips: &[ChipReadings]) -> ThermalSample {
        let cpu_temp = pick_chip(chips, &CPU_CHIPS).or_else(|| {
            // No known CPU chip: hottest reading anywhere.
            chips.iter().filter_map(ChipReadings::max_temp).reduce(f64::max)
        });
        let gpu_temp = pick_chip(chips, &GPU_CHIPS);

        ThermalSample { cpu_temp, gpu_temp }
    }
}

impl Default for ThermalCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for ThermalCollector {
    type Sample = ThermalSample;

    fn id(&self) -> &'static str {
        "sensors"
    }

    fn is_available(&self) -> bool {
        self.hwmon_root.exists()
    }

    fn collect(&mut self) -> Result<Self::Sample> {
        // Hosts without sensors report an empty sample, not an error.
        Ok(Self::summarize(&self.read_chips()))
    }
}

/// Hottest reading from the first preferred chip that is present.
fn pick_chip(chips: &[ChipReadings], preferred: &[&str]) -> Option<f64> {
    for wanted in preferred {
        if let Some(chip) = chips.iter().find(|c| c.name == *wanted) {
            if let Some(temp) = chip.max_temp() {
                return Some(temp);
            }
        }
    }
    None
}

/// Reads `temp<N>_input` files (millidegrees Celsius) for one chip.
fn read_chip_temps(chip_path: &Path) -> Vec<f64> {
    let mut temps = Vec::new();
    for i in 1..=32 {
        let input = chip_path.join(format!("temp{i}_input"));
        if !input.exists() {
            continue;
        }
        if let Some(raw) = read_trimmed(&input) {
            if let Ok(millidegrees) = raw.parse::<i64>() {
                temps.push(millidegrees as f64 / 1000.0);
            }
        }
    }
    temps
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}
