//! Deterministic scripted devices for tests and demos.
//!
//! Each read/poll consumes one step. Once the script is exhausted the
//! fallback step repeats forever (a missing echo / an empty frame unless
//! overridden).

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{RangeSource, SensorError, VisionSource};
use crate::types::{DetectionResult, SensorReading};

// ============================================================================
// Range
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RangeStep {
    /// A valid echo at this distance (cm)
    Distance(f64),
    /// Read succeeded but no echo came back
    NoEcho,
    /// The device reports an error
    Error(SensorError),
    /// The read hangs for this long, then returns a missing echo
    Stall(Duration),
}

pub struct ScriptedRangeSource {
    steps: VecDeque<RangeStep>,
    fallback: RangeStep,
    reads: Arc<AtomicUsize>,
}

impl ScriptedRangeSource {
    pub fn new(steps: impl IntoIterator<Item = RangeStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            fallback: RangeStep::NoEcho,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script of plain distances.
    pub fn distances(distances: impl IntoIterator<Item = f64>) -> Self {
        Self::new(distances.into_iter().map(RangeStep::Distance))
    }

    /// Step repeated after the script runs out.
    pub fn then_repeat(mut self, step: RangeStep) -> Self {
        self.fallback = step;
        self
    }

    /// Shared count of reads performed, observable after the source is moved
    /// into a coordinator.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

#[async_trait]
impl RangeSource for ScriptedRangeSource {
    async fn read(&mut self) -> Result<SensorReading, SensorError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.pop_front().unwrap_or_else(|| self.fallback.clone());
        match step {
            RangeStep::Distance(d) => Ok(SensorReading::valid(d, Instant::now())),
            RangeStep::NoEcho => Ok(SensorReading::invalid(Instant::now())),
            RangeStep::Error(e) => Err(e),
            RangeStep::Stall(duration) => {
                tokio::time::sleep(duration).await;
                Ok(SensorReading::invalid(Instant::now()))
            }
        }
    }

    fn source_name(&self) -> &str {
        "scripted-range"
    }
}

// ============================================================================
// Vision
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum VisionStep {
    /// Detections as (label, confidence, estimated distance)
    Frame(Vec<(String, f64, Option<f64>)>),
    Error(SensorError),
    Stall(Duration),
}

impl VisionStep {
    /// Frame holding a single detection.
    pub fn single(label: &str, confidence: f64, distance_cm: Option<f64>) -> Self {
        VisionStep::Frame(vec![(label.to_string(), confidence, distance_cm)])
    }

    pub fn empty() -> Self {
        VisionStep::Frame(Vec::new())
    }
}

pub struct ScriptedVisionSource {
    steps: VecDeque<VisionStep>,
    fallback: VisionStep,
    polls: Arc<AtomicUsize>,
}

impl ScriptedVisionSource {
    pub fn new(steps: impl IntoIterator<Item = VisionStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            fallback: VisionStep::empty(),
            polls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn then_repeat(mut self, step: VisionStep) -> Self {
        self.fallback = step;
        self
    }

    pub fn poll_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.polls)
    }
}

#[async_trait]
impl VisionSource for ScriptedVisionSource {
    async fn poll(&mut self) -> Result<Vec<DetectionResult>, SensorError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.pop_front().unwrap_or_else(|| self.fallback.clone());
        match step {
            VisionStep::Frame(items) => {
                let now = Instant::now();
                Ok(items
                    .into_iter()
                    .map(|(label, confidence, distance)| {
                        DetectionResult::new(label, confidence, distance, now)
                    })
                    .collect())
            }
            VisionStep::Error(e) => Err(e),
            VisionStep::Stall(duration) => {
                tokio::time::sleep(duration).await;
                Ok(Vec::new())
            }
        }
    }

    fn source_name(&self) -> &str {
        "scripted-vision"
    }
}
