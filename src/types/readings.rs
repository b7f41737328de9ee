//! Raw sensor readings: ultrasonic range samples and vision detections.

use tokio::time::Instant;

// ============================================================================
// Range
// ============================================================================

/// A single ultrasonic range sample.
///
/// `valid = false` marks a read failure or an out-of-range echo; such a
/// reading never carries a distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Measured distance (cm), `None` when the read failed
    pub distance_cm: Option<f64>,
    /// When the sample was taken
    pub timestamp: Instant,
    /// Whether the echo produced a usable distance
    pub valid: bool,
}

impl SensorReading {
    /// A successful echo.
    pub fn valid(distance_cm: f64, timestamp: Instant) -> Self {
        Self {
            distance_cm: Some(distance_cm),
            timestamp,
            valid: true,
        }
    }

    /// A failed read (no echo, timeout, device error).
    pub fn invalid(timestamp: Instant) -> Self {
        Self {
            distance_cm: None,
            timestamp,
            valid: false,
        }
    }

    /// The distance if this reading is usable: flagged valid, present,
    /// finite and non-negative.
    pub fn usable_distance(&self) -> Option<f64> {
        if !self.valid {
            return None;
        }
        self.distance_cm.filter(|d| d.is_finite() && *d >= 0.0)
    }
}

// ============================================================================
// Vision
// ============================================================================

/// One object reported by the detection model for a captured frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Class label (e.g. "person", "chair")
    pub label: String,
    /// Model confidence in [0, 1]
    pub confidence: f64,
    /// Distance estimate from the bounding box, if the model provides one
    pub estimated_distance_cm: Option<f64>,
    /// Capture time of the frame the detection came from
    pub timestamp: Instant,
}

impl DetectionResult {
    pub fn new(
        label: impl Into<String>,
        confidence: f64,
        estimated_distance_cm: Option<f64>,
        timestamp: Instant,
    ) -> Self {
        Self {
            label: label.into(),
            confidence,
            estimated_distance_cm,
            timestamp,
        }
    }

    /// Estimated distance, with "unknown" ordered as farthest.
    pub fn distance_or_far(&self) -> f64 {
        self.estimated_distance_cm
            .filter(|d| d.is_finite())
            .unwrap_or(f64::INFINITY)
    }
}
