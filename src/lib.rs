//! Canne: sensor fusion and alert arbitration for a smart white cane
//!
//! Turns a noisy ultrasonic range sensor and an occasional camera-based
//! object detector into spoken and vibrating feedback the user can trust.
//!
//! ## Architecture
//!
//! - **Acquisition**: device traits plus simulated, replayed and scripted sources
//! - **Filter**: median smoothing for range, confidence filtering for vision
//! - **Arbiter**: severity classification, cooldowns and message wording
//! - **Feedback**: preemptive queue driving the audio and haptic channels
//! - **Pipeline**: polling tasks, fusion task and the coordinator lifecycle

pub mod acquisition;
pub mod arbiter;
pub mod config;
pub mod feedback;
pub mod filter;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::{CanneConfig, ConfigError};

// Re-export commonly used types
pub use types::{
    DetectionResult, FeedbackCommand, HapticPattern, HazardState, OutputChannel, Pulse,
    SensorReading, Severity,
};

// Re-export the device seams
pub use acquisition::{RangeSource, SensorError, VisionSource};
pub use feedback::{AudioOutput, HapticOutput, OutputError};

// Re-export the runtime
pub use arbiter::AlertArbiter;
pub use feedback::FeedbackQueue;
pub use pipeline::{Coordinator, CoordinatorStats, CoordinatorStatus, Devices, StartupError};
