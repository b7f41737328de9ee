//! Alert arbitration: hazard fusion, severity policy, cooldowns and
//! message rendering.
//!
//! The arbiter is a plain state machine owned by the fusion task; it never
//! performs I/O and takes the current time as an argument.

mod alert_arbiter;
mod cooldown;
mod messages;

pub use alert_arbiter::{AlertArbiter, Assessment};
pub use cooldown::CooldownTracker;
pub use messages::Messages;
