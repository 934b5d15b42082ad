use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::LimiterCfg;
use crate::limiter::band::ChargeBand;
use crate::power::ChargeStatus;

/// One sampled set of control-loop inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeReading {
    pub status: ChargeStatus,
    /// State of charge, 0 to 100.
    pub percent: u8,
    pub usb_present: bool,
}

impl ChargeReading {
    /// True when a charging path exists that could need suppressing.
    pub fn has_charge_path(&self) -> bool {
        self.status == ChargeStatus::Charging || self.usb_present
    }
}

/// Actuator request produced by a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeRequest {
    Enable,
    Disable,
}

/// Delay class for the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDelay {
    /// Healthy tick.
    Normal,
    /// A power-supply lookup or property read failed; poll slowly.
    FaultBackoff,
    /// A cutoff was armed; give the reading one long interval to settle.
    Debounce,
}

impl TickDelay {
    pub fn interval(self, cfg: &LimiterCfg) -> Duration {
        match self {
            Self::Normal => Duration::from_millis(cfg.tick_ms),
            Self::FaultBackoff => Duration::from_millis(cfg.fault_backoff_ms),
            Self::Debounce => Duration::from_millis(cfg.debounce_ms),
        }
    }
}

/// Outcome of one tick decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickDecision {
    pub request: Option<ChargeRequest>,
    pub cutoff_pending: bool,
    pub delay: TickDelay,
}

/// Decide what one tick should do.
///
/// Pure: the caller owns the band and the armed-cutoff flag and applies
/// the returned state. A cutoff is never issued on the first high sample;
/// it is armed, and only a second consecutive high sample fires it.
pub fn decide(reading: &ChargeReading, band: &ChargeBand, cutoff_pending: bool) -> TickDecision {
    let mut request = None;
    let mut pending = cutoff_pending;
    let mut delay = TickDelay::Normal;

    if reading.percent <= band.lower() {
        // At or below the resume point charging is always wanted,
        // whatever the previous ticks decided.
        request = Some(ChargeRequest::Enable);
        pending = false;
    } else if reading.percent < band.upper() {
        // Inside the band there is nothing to do, and an armed cutoff is
        // stale: the charge sagged back before the debounce expired.
        pending = false;
    } else if reading.has_charge_path() {
        // At or above the cutoff point while charging (or with USB
        // attached, which could start charging at any moment).
        if pending {
            request = Some(ChargeRequest::Disable);
            pending = false;
        } else {
            pending = true;
            delay = TickDelay::Debounce;
        }
    }
    // At or above the cutoff point with no charging path: nothing to
    // suppress, and an armed cutoff stays armed.

    TickDecision {
        request,
        cutoff_pending: pending,
        delay,
    }
}
