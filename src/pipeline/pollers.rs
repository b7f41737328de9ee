//! Sensor polling tasks.
//!
//! Each poller owns its device and its filter, reads on a fixed interval
//! with a hard per-read timeout, and forwards the filtered view to the
//! fusion task. A stuck or failing device degrades to invalid readings; it
//! never stalls the loop. Cancellation is checked between cycles.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::PipelineCounters;
use crate::acquisition::{RangeSource, SensorError, VisionSource};
use crate::filter::{DetectionFilter, FilteredDetections, FilteredRange, RangeFilter};
use crate::types::SensorReading;

/// Update sent from a poller to the fusion task.
#[derive(Debug, Clone, PartialEq)]
pub enum FusionEvent {
    Range(FilteredRange),
    Vision(VisionUpdate),
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisionUpdate {
    /// A successful poll
    Detections(FilteredDetections),
    /// Polls have been failing for longer than the stale timeout
    Unavailable,
}

// ============================================================================
// Range
// ============================================================================

pub struct RangePoller {
    source: Box<dyn RangeSource>,
    filter: RangeFilter,
    interval: Duration,
    read_timeout: Duration,
    events: mpsc::Sender<FusionEvent>,
    cancel: CancellationToken,
    counters: Arc<PipelineCounters>,
    fatal_streak: u32,
}

impl RangePoller {
    pub fn new(
        source: Box<dyn RangeSource>,
        filter: RangeFilter,
        interval: Duration,
        read_timeout: Duration,
        events: mpsc::Sender<FusionEvent>,
        cancel: CancellationToken,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            source,
            filter,
            interval,
            read_timeout,
            events,
            cancel,
            counters,
            fatal_streak: 0,
        }
    }

    pub async fn run(mut self) {
        info!(
            source = self.source.source_name(),
            interval_ms = self.interval.as_millis() as u64,
            "Range poller started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut was_unavailable = self.filter.current().is_unavailable();
        let mut dropped = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let reading = self.read_once().await;
            let filtered = self.filter.push(reading);
            PipelineCounters::incr(&self.counters.range_cycles);

            let unavailable = filtered.is_unavailable();
            if unavailable && !was_unavailable {
                PipelineCounters::incr(&self.counters.range_unavailable_episodes);
                debug!(missed = self.filter.consecutive_invalid(), "Range unavailable episode started");
            }
            was_unavailable = unavailable;

            // Newer cycles supersede a skipped one, so never wait on fusion
            match self.events.try_send(FusionEvent::Range(filtered)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    debug!(dropped, "Fusion busy, range update skipped");
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }

        info!(source = self.source.source_name(), dropped, "Range poller stopped");
    }

    async fn read_once(&mut self) -> SensorReading {
        let result = tokio::time::timeout(self.read_timeout, self.source.read()).await;
        let error = match result {
            Ok(Ok(reading)) => {
                self.fatal_streak = 0;
                return reading;
            }
            Ok(Err(e)) => e,
            Err(_) => SensorError::Timeout(format!(
                "no answer within {} ms",
                self.read_timeout.as_millis()
            )),
        };

        PipelineCounters::incr(&self.counters.range_read_errors);
        match &error {
            SensorError::Timeout(reason) => debug!(reason = %reason, "Range read timed out"),
            SensorError::Fatal(reason) => {
                self.fatal_streak += 1;
                if self.fatal_streak == 1 {
                    warn!(reason = %reason, "Range sensor failure, treating as missing echo");
                } else {
                    debug!(reason = %reason, streak = self.fatal_streak, "Range sensor still failing");
                }
            }
        }
        SensorReading::invalid(Instant::now())
    }
}

// ============================================================================
// Vision
// ============================================================================

pub struct VisionPoller {
    source: Box<dyn VisionSource>,
    filter: DetectionFilter,
    interval: Duration,
    poll_timeout: Duration,
    events: mpsc::Sender<FusionEvent>,
    cancel: CancellationToken,
    counters: Arc<PipelineCounters>,
}

impl VisionPoller {
    pub fn new(
        source: Box<dyn VisionSource>,
        filter: DetectionFilter,
        interval: Duration,
        poll_timeout: Duration,
        events: mpsc::Sender<FusionEvent>,
        cancel: CancellationToken,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            source,
            filter,
            interval,
            poll_timeout,
            events,
            cancel,
            counters,
        }
    }

    pub async fn run(mut self) {
        info!(
            source = self.source.source_name(),
            interval_ms = self.interval.as_millis() as u64,
            "Vision poller started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            PipelineCounters::incr(&self.counters.vision_cycles);
            let update = match tokio::time::timeout(self.poll_timeout, self.source.poll()).await {
                Ok(Ok(frame)) => {
                    let filtered = self.filter.filter(frame, Instant::now());
                    debug!(detections = filtered.detections.len(), "Vision frame filtered");
                    Some(VisionUpdate::Detections(filtered))
                }
                Ok(Err(e)) => self.on_failure(&e),
                Err(_) => self.on_failure(&SensorError::Timeout(format!(
                    "no frame within {} ms",
                    self.poll_timeout.as_millis()
                ))),
            };

            // Vision updates are rare and state-changing: wait for room
            if let Some(update) = update {
                if self.events.send(FusionEvent::Vision(update)).await.is_err() {
                    break;
                }
            }
        }

        info!(source = self.source.source_name(), "Vision poller stopped");
    }

    fn on_failure(&mut self, error: &SensorError) -> Option<VisionUpdate> {
        PipelineCounters::incr(&self.counters.vision_failures);
        let failures = self.filter.consecutive_failures() + 1;
        if error.is_fatal() {
            warn!(error = %error, failures, "Vision poll failed");
        } else {
            debug!(error = %error, failures, "Vision poll failed");
        }
        self.filter
            .record_failure(Instant::now())
            .then_some(VisionUpdate::Unavailable)
    }
}
