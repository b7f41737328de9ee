//! Sensor acquisition: the two device seams feeding the pipeline.
//!
//! The range source is the fast proximity channel (ultrasonic echo, ~10 Hz);
//! the vision source is the slow identity channel (capture + inference, ~1 Hz).
//! Both are async traits so real drivers, simulations, CSV replays and test
//! scripts are interchangeable. Handles are released by dropping the boxed
//! device.

pub mod replay;
pub mod scripted;
pub mod simulated;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{DetectionResult, SensorReading};

pub use replay::ReplayRangeSource;
pub use scripted::{RangeStep, ScriptedRangeSource, ScriptedVisionSource, VisionStep};
pub use simulated::{SimulatedRangeSource, SimulatedVisionSource};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    /// No answer in time; the cycle is skipped.
    #[error("Sensor timed out: {0}")]
    Timeout(String),

    /// The device is gone or unusable.
    #[error("Sensor failure: {0}")]
    Fatal(String),
}

impl SensorError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SensorError::Fatal(_))
    }
}

// ============================================================================
// Device Traits
// ============================================================================

/// Ultrasonic ranging device.
///
/// A missing echo is `Ok` with an invalid reading; `Err` is reserved for
/// the device itself misbehaving.
#[async_trait]
pub trait RangeSource: Send + 'static {
    /// Take one range sample.
    async fn read(&mut self) -> Result<SensorReading, SensorError>;

    /// Human-readable name for logging (e.g. "hc-sr04", "replay").
    fn source_name(&self) -> &str;
}

/// Camera + object detection model.
#[async_trait]
pub trait VisionSource: Send + 'static {
    /// Capture one frame and return every detection the model reports.
    async fn poll(&mut self) -> Result<Vec<DetectionResult>, SensorError>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}
