//! chargecap: an adaptive battery charge limiter.
//!
//! A timer-driven control loop samples a battery and a USB supply each
//! tick and switches the charging path on or off to keep the state of
//! charge inside a configured band, with a debounce interval before any
//! cutoff. Three tunables (`enabled`, `lower_threshold`,
//! `upper_threshold`) are exposed over a Unix control socket.

pub mod config;
pub mod ctl;
pub mod error;
pub mod limiter;
pub mod power;
pub mod shutdown;
