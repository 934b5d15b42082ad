use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PowerError;

/// Charging status reported by a battery-like supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Charging,
    Discharging,
    Full,
    /// Attached to a charger but not taking current.
    NotCharging,
    Unknown,
}

impl ChargeStatus {
    /// Parse the kernel's `status` attribute wording.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "Charging" => Self::Charging,
            "Discharging" => Self::Discharging,
            "Full" => Self::Full,
            "Not charging" => Self::NotCharging,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Charging => "charging",
            Self::Discharging => "discharging",
            Self::Full => "full",
            Self::NotCharging => "not charging",
            Self::Unknown => "unknown",
        }
    }
}

/// A battery- or USB-like power supply exposing readable properties.
///
/// Reads are expected to return promptly or fail fast; the control loop
/// treats every error here as a transient fault and backs off.
pub trait PowerSource: Send + Sync {
    fn status(&self) -> Result<ChargeStatus, PowerError>;

    /// State of charge in percent, clamped to 100.
    fn capacity(&self) -> Result<u8, PowerError>;

    /// Presence/connection flag (`online` for USB and AC suppliers).
    fn present(&self) -> Result<bool, PowerError>;
}

/// Looks power supplies up by name.
pub trait PowerRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<dyn PowerSource>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_kernel_wording() {
        assert_eq!(ChargeStatus::parse("Charging"), ChargeStatus::Charging);
        assert_eq!(ChargeStatus::parse("Discharging\n"), ChargeStatus::Discharging);
        assert_eq!(ChargeStatus::parse("Full"), ChargeStatus::Full);
        assert_eq!(ChargeStatus::parse("Not charging"), ChargeStatus::NotCharging);
        assert_eq!(ChargeStatus::parse("Wireless nonsense"), ChargeStatus::Unknown);
        assert_eq!(ChargeStatus::parse(""), ChargeStatus::Unknown);
    }
}
