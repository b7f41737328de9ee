//! Feedback output: the two physical channels and the queue serialising
//! commands onto them.
//!
//! - `AudioOutput` speaks a message, `HapticOutput` plays a vibration motif
//! - `FeedbackQueue` holds one pending command per channel and applies the
//!   severity preemption rules
//! - `patterns` maps severities to haptic motifs

pub mod console;
pub mod patterns;
mod queue;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::HapticPattern;

pub use console::{LogAudioOutput, LogHapticOutput};
pub use queue::{FeedbackQueue, QueueStats, SubmitOutcome};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OutputError {
    #[error("Output device busy: {0}")]
    Busy(String),

    #[error("Output failed: {0}")]
    Failed(String),
}

// ============================================================================
// Device Traits
// ============================================================================

/// Speech output. `play` returns once the message has been spoken; dropping
/// the future stops playback.
#[async_trait]
pub trait AudioOutput: Send + 'static {
    async fn play(&mut self, message: &str) -> Result<(), OutputError>;
}

/// Vibration motor. `pulse` returns once the motif has finished; dropping
/// the future stops the motor.
#[async_trait]
pub trait HapticOutput: Send + 'static {
    async fn pulse(&mut self, pattern: &HapticPattern) -> Result<(), OutputError>;
}
