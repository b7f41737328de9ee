//! Fusion task: keeps the latest filtered view of each sensor, runs the
//! arbiter on every update and hands commands to the feedback queue.
//!
//! Fusion is best-effort, not time-aligned: each evaluation combines the
//! most recent range view with the most recent vision frame. The task ends
//! once every poller has dropped its sender and the channel is drained.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::pollers::{FusionEvent, VisionUpdate};
use super::state::PipelineCounters;
use crate::arbiter::AlertArbiter;
use crate::config::defaults::FUSION_CYCLE_WARN_MS;
use crate::feedback::{FeedbackQueue, SubmitOutcome};
use crate::filter::{FilteredDetections, FilteredRange};
use crate::types::HazardState;

pub struct FusionLoop {
    arbiter: AlertArbiter,
    queue: FeedbackQueue,
    events: mpsc::Receiver<FusionEvent>,
    hazard: watch::Sender<HazardState>,
    counters: Arc<PipelineCounters>,
    range: FilteredRange,
    /// `None` while vision is disabled or unavailable
    vision: Option<FilteredDetections>,
}

impl FusionLoop {
    pub fn new(
        arbiter: AlertArbiter,
        queue: FeedbackQueue,
        events: mpsc::Receiver<FusionEvent>,
        hazard: watch::Sender<HazardState>,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            arbiter,
            queue,
            events,
            hazard,
            counters,
            range: FilteredRange::Pending,
            vision: None,
        }
    }

    /// Seed the sensor views with the startup priming results.
    pub fn with_initial(mut self, range: FilteredRange, vision: Option<FilteredDetections>) -> Self {
        self.range = range;
        self.vision = vision;
        self
    }

    pub async fn run(mut self) {
        info!("Fusion task started");
        let mut issued = 0u64;

        while let Some(event) = self.events.recv().await {
            match event {
                FusionEvent::Range(range) => self.range = range,
                FusionEvent::Vision(VisionUpdate::Detections(frame)) => self.vision = Some(frame),
                FusionEvent::Vision(VisionUpdate::Unavailable) => self.vision = None,
            }

            let now = Instant::now();
            let assessment = self.arbiter.evaluate(&self.range, self.vision.as_ref(), now);
            PipelineCounters::incr(&self.counters.evaluations);

            self.hazard.send_if_modified(|current| {
                // Timestamps alone do not count as a change
                let changed = current.severity != assessment.state.severity
                    || current.distance_cm != assessment.state.distance_cm
                    || current.object_label != assessment.state.object_label;
                *current = assessment.state.clone();
                changed
            });

            if let Some(command) = assessment.command {
                issued += 1;
                PipelineCounters::incr(&self.counters.commands_issued);
                if self.queue.submit(command.clone()) == SubmitOutcome::Rejected {
                    debug!(id = command.id, "Command not admitted by feedback queue");
                    self.arbiter.on_rejected(&command);
                }
            }

            let elapsed = now.elapsed().as_millis();
            if elapsed > FUSION_CYCLE_WARN_MS {
                warn!(elapsed_ms = elapsed as u64, "Slow fusion cycle");
            }
        }

        info!(issued, final_severity = %self.arbiter.last_severity(), "Fusion task drained");
    }
}
