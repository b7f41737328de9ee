//! Shared data structures for the sensing → alerting pipeline
//!
//! - Raw inputs: `SensorReading` (ultrasonic range), `DetectionResult` (vision)
//! - Fused output: `HazardState` with its ordered `Severity`
//! - Output requests: `FeedbackCommand` carrying a spoken message and a `HapticPattern`

mod readings;
mod hazard;
mod feedback;

pub use readings::*;
pub use hazard::*;
pub use feedback::*;
