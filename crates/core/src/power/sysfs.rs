//! Sysfs-backed power supply access.
//!
//! Reads `<root>/<name>/...` in the layout of `/sys/class/power_supply`.
//! The root is configurable so the whole stack can run against a tempdir
//! fixture in tests, and against non-standard sysfs mounts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::PowerError;
use crate::power::source::{ChargeStatus, PowerRegistry, PowerSource};
use crate::power::switch::ChargingSwitch;

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/power_supply";

/// Registry over a power-supply class directory.
#[derive(Debug, Clone)]
pub struct SysfsPowerRegistry {
    root: PathBuf,
}

impl SysfsPowerRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsPowerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl PowerRegistry for SysfsPowerRegistry {
    fn lookup(&self, name: &str) -> Option<Arc<dyn PowerSource>> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return None;
        }
        Some(Arc::new(SysfsPowerSource {
            name: name.to_owned(),
            dir,
        }))
    }
}

/// One supply directory. Reads are plain synchronous file reads; sysfs
/// attributes are tiny and served from memory by the kernel.
#[derive(Debug)]
pub struct SysfsPowerSource {
    name: String,
    dir: PathBuf,
}

impl SysfsPowerSource {
    fn read_attr(&self, attribute: &'static str) -> Result<String, PowerError> {
        let path = self.dir.join(attribute);
        if !path.is_file() {
            return Err(PowerError::PropertyUnsupported {
                name: self.name.clone(),
                attribute,
            });
        }
        fs::read_to_string(&path).map_err(|source| PowerError::Io {
            name: self.name.clone(),
            attribute,
            source,
        })
    }

    fn read_int(&self, attribute: &'static str) -> Result<i64, PowerError> {
        let raw = self.read_attr(attribute)?;
        raw.trim().parse().map_err(|_| PowerError::Malformed {
            name: self.name.clone(),
            attribute,
            value: raw.trim().to_owned(),
        })
    }
}

impl PowerSource for SysfsPowerSource {
    fn status(&self) -> Result<ChargeStatus, PowerError> {
        Ok(ChargeStatus::parse(&self.read_attr("status")?))
    }

    fn capacity(&self) -> Result<u8, PowerError> {
        Ok(self.read_int("capacity")?.clamp(0, 100) as u8)
    }

    fn present(&self) -> Result<bool, PowerError> {
        // USB and AC suppliers report `online` instead of `present`.
        let raw = match self.read_int("present") {
            Ok(v) => v,
            Err(PowerError::PropertyUnsupported { .. }) => self.read_int("online")?,
            Err(e) => return Err(e),
        };
        Ok(raw != 0)
    }
}

/// Charging on/off via whichever control attribute the battery driver
/// exposes: `charging_enabled` (1/0) on Android-lineage drivers, else
/// `charge_behaviour` (auto/inhibit-charge) on mainline laptop drivers.
#[derive(Debug, Clone)]
pub struct SysfsChargingSwitch {
    root: PathBuf,
}

impl SysfsChargingSwitch {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsChargingSwitch {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl ChargingSwitch for SysfsChargingSwitch {
    fn set_charging_enabled(&self, name: &str, enable: bool) -> Result<(), PowerError> {
        let dir = self.root.join(name);

        let direct = dir.join("charging_enabled");
        if direct.is_file() {
            let value = if enable { "1" } else { "0" };
            return write_attr(&direct, name, "charging_enabled", value);
        }

        let behaviour = dir.join("charge_behaviour");
        if behaviour.is_file() {
            let value = if enable { "auto" } else { "inhibit-charge" };
            return write_attr(&behaviour, name, "charge_behaviour", value);
        }

        Err(PowerError::PropertyUnsupported {
            name: name.to_owned(),
            attribute: "charging_enabled",
        })
    }
}

fn write_attr(
    path: &Path,
    name: &str,
    attribute: &'static str,
    value: &str,
) -> Result<(), PowerError> {
    fs::write(path, value).map_err(|source| PowerError::Io {
        name: name.to_owned(),
        attribute,
        source,
    })
}
