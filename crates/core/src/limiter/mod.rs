mod band;
mod decision;
mod gate;
mod runtime;

pub use band::ChargeBand;
pub use decision::{ChargeReading, ChargeRequest, TickDecision, TickDelay, decide};
pub use gate::ChargeGate;
pub use runtime::{Limiter, LimiterStatus};
