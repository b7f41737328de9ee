//! Feedback commands handed from the arbiter to the feedback queue.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use super::Severity;

/// Physical output(s) a command targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OutputChannel {
    Audio,
    Haptic,
    Both,
}

impl std::fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputChannel::Audio => write!(f, "audio"),
            OutputChannel::Haptic => write!(f, "haptic"),
            OutputChannel::Both => write!(f, "audio+haptic"),
        }
    }
}

/// One vibration burst followed by a pause.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pulse {
    pub on_ms: u64,
    pub off_ms: u64,
}

/// A vibration motif played once by the haptic output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HapticPattern {
    pub pulses: Vec<Pulse>,
    /// Motor drive level in [0, 1]
    pub intensity: f32,
}

impl HapticPattern {
    /// Total time the motif occupies the motor, pauses included.
    pub fn duration(&self) -> Duration {
        let ms: u64 = self.pulses.iter().map(|p| p.on_ms + p.off_ms).sum();
        Duration::from_millis(ms)
    }
}

/// A rendered alert waiting for (or undergoing) physical output.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackCommand {
    /// Issue sequence number, increasing per arbiter
    pub id: u64,
    pub channel: OutputChannel,
    /// Spoken text for the audio channel
    pub message: String,
    /// Vibration motif for the haptic channel
    pub pattern: HapticPattern,
    pub severity: Severity,
    pub issued_at: Instant,
}
