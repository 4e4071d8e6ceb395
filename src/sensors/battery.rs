use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{BatteryReading, BatterySource};
use crate::kernel::error::SensorFault;

const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// Reads capacity and charge status from the Linux power-supply class.
#[derive(Debug, Clone)]
pub struct SysfsBattery {
    dir: PathBuf,
}

impl SysfsBattery {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    /// First `BAT*` or `*battery*` entry under the power-supply class.
    pub fn discover() -> Option<Self> {
        Self::discover_in(POWER_SUPPLY_DIR)
    }

    pub fn discover_in(root: impl AsRef<Path>) -> Option<Self> {
        let mut candidates: Vec<PathBuf> = fs::read_dir(root.as_ref())
            .ok()?
            .filter_map(Result::ok)
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy().to_lowercase();
                name.starts_with("bat") || name.contains("battery")
            })
            .map(|entry| entry.path())
            .collect();
        candidates.sort();
        let dir = candidates.into_iter().next()?;
        debug!("Using battery at {:?}", dir);
        Some(Self { dir })
    }

    fn read_field(&self, name: &str) -> Result<String, SensorFault> {
        fs::read_to_string(self.dir.join(name))
            .map(|s| s.trim().to_string())
            .map_err(|e| SensorFault::Unavailable(format!("{}: {}", name, e)))
    }
}

impl BatterySource for SysfsBattery {
    fn read(&mut self) -> Result<BatteryReading, SensorFault> {
        let raw = self.read_field("capacity")?;
        let level_pct: f32 = raw
            .parse()
            .map_err(|_| SensorFault::Unavailable(format!("capacity not numeric: {raw:?}")))?;
        if !(0.0..=100.0).contains(&level_pct) {
            return Err(SensorFault::OutOfRange { value: level_pct, min: 0.0, max: 100.0 });
        }
        // Missing status file is treated as discharging.
        let status = self.read_field("status").unwrap_or_default().to_lowercase();
        let charging = (status.contains("charging") && !status.contains("discharging"))
            || status.contains("full");
        Ok(BatteryReading { level_pct, charging })
    }
}

/// Deterministic drain for demos and tests: loses `drain_pct` per sample,
/// gains `charge_pct` per sample while charging.
#[derive(Debug, Clone)]
pub struct SimulatedBattery {
    level_pct: f32,
    charging: bool,
    drain_pct: f32,
    charge_pct: f32,
}

impl SimulatedBattery {
    pub fn new(level_pct: f32, drain_pct: f32) -> Self {
        Self { level_pct: level_pct.clamp(0.0, 100.0), charging: false, drain_pct, charge_pct: 0.5 }
    }

    pub fn set_charging(&mut self, charging: bool) {
        self.charging = charging;
    }

    pub fn level_pct(&self) -> f32 {
        self.level_pct
    }
}

impl BatterySource for SimulatedBattery {
    fn read(&mut self) -> Result<BatteryReading, SensorFault> {
        let reading = BatteryReading { level_pct: self.level_pct, charging: self.charging };
        self.level_pct = if self.charging {
            (self.level_pct + self.charge_pct).min(100.0)
        } else {
            (self.level_pct - self.drain_pct).max(0.0)
        };
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_sysfs_layout() {
        let root = std::env::temp_dir().join(format!("wayfinder-ps-{}", std::process::id()));
        let bat = root.join("BAT0");
        fs::create_dir_all(&bat).unwrap();
        fs::write(bat.join("capacity"), "42\n").unwrap();
        fs::write(bat.join("status"), "Discharging\n").unwrap();

        let mut battery = SysfsBattery::discover_in(&root).expect("battery dir");
        let reading = battery.read().unwrap();
        assert_eq!(reading.level_pct, 42.0);
        assert!(!reading.charging);

        fs::write(bat.join("status"), "Charging\n").unwrap();
        assert!(battery.read().unwrap().charging);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn simulated_battery_drains() {
        let mut battery = SimulatedBattery::new(10.0, 4.0);
        assert_eq!(battery.read().unwrap().level_pct, 10.0);
        assert_eq!(battery.read().unwrap().level_pct, 6.0);
        assert_eq!(battery.read().unwrap().level_pct, 2.0);
        assert_eq!(battery.read().unwrap().level_pct, 0.0);
    }
}
