mod source;
mod switch;
mod sysfs;

pub use source::{ChargeStatus, PowerRegistry, PowerSource};
pub use switch::ChargingSwitch;
pub use sysfs::{DEFAULT_SYSFS_ROOT, SysfsChargingSwitch, SysfsPowerRegistry};
