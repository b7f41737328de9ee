//! Sensing Pipeline Module
//!
//! ## Task Layout
//!
//! ```text
//! RangePoller  : read → timeout → median filter → FusionEvent::Range
//! VisionPoller : poll → timeout → detection filter → FusionEvent::Vision
//! FusionLoop   : latest views → AlertArbiter → hazard watch + FeedbackQueue
//! Dispatcher   : FeedbackQueue → audio / haptic workers
//! ```
//!
//! The `Coordinator` owns the devices, spawns the four tasks and drains them
//! in order on shutdown.

mod coordinator;
mod devices;
mod fusion;
mod pollers;
mod state;

pub use coordinator::{Coordinator, StartupError};
pub use devices::Devices;
pub use fusion::FusionLoop;
pub use pollers::{FusionEvent, RangePoller, VisionPoller, VisionUpdate};
pub use state::*;
