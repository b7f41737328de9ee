//! Vision detection filtering and staleness.

use std::cmp::Ordering;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::VisionConfig;
use crate::types::DetectionResult;

/// Detections from one successful vision poll, after filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredDetections {
    /// Confident detections, most salient first
    pub detections: Vec<DetectionResult>,
    /// Capture time of the frame
    pub captured_at: Instant,
}

impl FilteredDetections {
    /// The detection that speaks for the frame: highest confidence, nearer on ties.
    pub fn representative(&self) -> Option<&DetectionResult> {
        self.detections.first()
    }

    /// Whether the frame still describes the scene at `now`.
    pub fn is_current(&self, now: Instant, max_age: Duration) -> bool {
        now.saturating_duration_since(self.captured_at) <= max_age
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Salience order: confidence descending, then estimated distance ascending
/// (unknown distance counts as farthest).
fn salience(a: &DetectionResult, b: &DetectionResult) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.distance_or_far().total_cmp(&b.distance_or_far()))
}

pub struct DetectionFilter {
    confidence_floor: f64,
    max_detections: usize,
    stale_timeout: Duration,
    started: Instant,
    last_success: Option<Instant>,
    consecutive_failures: u32,
    unavailable: bool,
}

impl DetectionFilter {
    pub fn new(config: &VisionConfig, now: Instant) -> Self {
        Self {
            confidence_floor: config.confidence_floor,
            max_detections: config.max_detections.max(1),
            stale_timeout: config.stale_timeout(),
            started: now,
            last_success: None,
            consecutive_failures: 0,
            unavailable: false,
        }
    }

    /// Filter the output of a successful poll completed at `now`.
    pub fn filter(&mut self, frame: Vec<DetectionResult>, now: Instant) -> FilteredDetections {
        if self.unavailable {
            info!(missed = self.consecutive_failures, "Vision recovered");
            self.unavailable = false;
        }
        self.last_success = Some(now);
        self.consecutive_failures = 0;

        let captured_at = frame.iter().map(|d| d.timestamp).max().unwrap_or(now);
        let raw = frame.len();

        let mut detections: Vec<DetectionResult> = frame
            .into_iter()
            .filter(|d| d.confidence.is_finite() && d.confidence >= self.confidence_floor)
            .collect();
        detections.sort_by(salience);
        detections.truncate(self.max_detections);

        if raw > detections.len() {
            debug!(raw, kept = detections.len(), "Filtered vision detections");
        }

        FilteredDetections {
            detections,
            captured_at,
        }
    }

    /// Record a failed poll. Returns `true` when this failure made vision
    /// unavailable.
    pub fn record_failure(&mut self, now: Instant) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if !self.unavailable && !self.is_available(now) {
            info!(consecutive_failures = self.consecutive_failures, "Vision unavailable");
            self.unavailable = true;
            return true;
        }
        false
    }

    /// Whether a successful poll happened within the stale timeout.
    pub fn is_available(&self, now: Instant) -> bool {
        let reference = self.last_success.unwrap_or(self.started);
        now.saturating_duration_since(reference) <= self.stale_timeout
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
