use crate::error::PowerError;

/// Enables or disables the charging path on a named supply.
///
/// A single idempotent operation: asking for a state the hardware is
/// already in must succeed. Failures are reported so the caller can
/// retry; they are never fatal.
pub trait ChargingSwitch: Send + Sync {
    fn set_charging_enabled(&self, name: &str, enable: bool) -> Result<(), PowerError>;
}
