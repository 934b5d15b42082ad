use crate::limiter::decision::ChargeRequest;
use crate::power::ChargingSwitch;

/// Tracks whether the limiter has suppressed charging and forwards
/// enable/disable requests to the switch only when they would change that
/// state, so every tick can re-issue its request without redundant
/// hardware writes.
///
/// The flag flips on switch success only. A failed write leaves it
/// unchanged and the next tick retries the same request.
#[derive(Debug, Default)]
pub struct ChargeGate {
    suppressed: bool,
}

impl ChargeGate {
    pub fn new() -> Self {
        Self { suppressed: false }
    }

    /// True when the last successful switch write disabled charging.
    pub fn suppressed(&self) -> bool {
        self.suppressed
    }

    /// Forward `request` to the switch if it changes the tracked state.
    pub fn apply(&mut self, switch: &dyn ChargingSwitch, battery: &str, request: ChargeRequest) {
        let enable = request == ChargeRequest::Enable;
        if self.suppressed != enable {
            // Already in the requested state; nothing to write.
            return;
        }
        match switch.set_charging_enabled(battery, enable) {
            Ok(()) => {
                self.suppressed = !enable;
                tracing::info!(battery, enable, "charging path switched");
            }
            Err(e) => {
                tracing::warn!(battery, enable, error = %e, "charging switch failed, retrying next tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PowerError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSwitch {
        calls: Mutex<Vec<bool>>,
        fail: bool,
    }

    impl ChargingSwitch for RecordingSwitch {
        fn set_charging_enabled(&self, name: &str, enable: bool) -> Result<(), PowerError> {
            if self.fail {
                return Err(PowerError::NotFound(name.to_owned()));
            }
            self.calls.lock().unwrap().push(enable);
            Ok(())
        }
    }

    #[test]
    fn enable_skipped_when_not_suppressed() {
        let switch = RecordingSwitch::default();
        let mut gate = ChargeGate::new();
        gate.apply(&switch, "battery", ChargeRequest::Enable);
        assert!(switch.calls.lock().unwrap().is_empty());
        assert!(!gate.suppressed());
    }

    #[test]
    fn disable_then_enable_round_trip() {
        let switch = RecordingSwitch::default();
        let mut gate = ChargeGate::new();

        gate.apply(&switch, "battery", ChargeRequest::Disable);
        assert!(gate.suppressed());

        // Repeated disables are absorbed.
        gate.apply(&switch, "battery", ChargeRequest::Disable);
        assert_eq!(*switch.calls.lock().unwrap(), vec![false]);

        gate.apply(&switch, "battery", ChargeRequest::Enable);
        assert!(!gate.suppressed());
        assert_eq!(*switch.calls.lock().unwrap(), vec![false, true]);
    }

    #[test]
    fn failed_write_leaves_state_for_retry() {
        let failing = RecordingSwitch {
            fail: true,
            ..Default::default()
        };
        let mut gate = ChargeGate::new();
        gate.apply(&failing, "battery", ChargeRequest::Disable);
        assert!(!gate.suppressed(), "failure must not mark charging suppressed");

        // Next tick retries against a healthy switch and succeeds.
        let healthy = RecordingSwitch::default();
        gate.apply(&healthy, "battery", ChargeRequest::Disable);
        assert!(gate.suppressed());
        assert_eq!(*healthy.calls.lock().unwrap(), vec![false]);
    }
}
