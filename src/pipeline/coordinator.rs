//! Coordinator - owns the device handles and the task schedule.
//!
//! ```text
//! RangePoller  (10 Hz) ──┐
//!                        ├─ mpsc ─► FusionLoop ─► FeedbackQueue ─► audio worker
//! VisionPoller (1 Hz) ───┘            │                         └► haptic worker
//!                                     └─ watch ─► hazard()
//! ```
//!
//! Shutdown runs upstream to downstream: pollers stop between cycles, fusion
//! drains what they already sent, then the dispatcher finishes (or cuts off)
//! the in-flight output and the devices are dropped.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::devices::Devices;
use super::fusion::FusionLoop;
use super::pollers::{FusionEvent, RangePoller, VisionPoller};
use super::state::{CoordinatorStats, CoordinatorStatus, PipelineCounters};
use crate::acquisition::{SensorError, VisionSource};
use crate::arbiter::AlertArbiter;
use crate::config::defaults::FUSION_CHANNEL_CAPACITY;
use crate::config::{CanneConfig, ConfigError};
use crate::feedback::FeedbackQueue;
use crate::filter::{DetectionFilter, FilteredDetections, RangeFilter};
use crate::types::{HazardState, SensorReading};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Sensor '{source_name}' failed during startup: {reason}")]
    SensorFatal { source_name: String, reason: String },

    #[error("Coordinator was already started")]
    AlreadyStarted,
}

// ============================================================================
// Coordinator
// ============================================================================

struct RunningTasks {
    range: JoinHandle<()>,
    vision: Option<JoinHandle<()>>,
    fusion: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

pub struct Coordinator {
    devices: Option<Devices>,
    status: watch::Sender<CoordinatorStatus>,
    hazard: watch::Sender<HazardState>,
    queue: FeedbackQueue,
    counters: Arc<PipelineCounters>,
    /// Stops the pollers
    sensing_cancel: CancellationToken,
    /// Stops the feedback dispatcher
    dispatch_cancel: CancellationToken,
    tasks: Option<RunningTasks>,
    started_at: Option<DateTime<Utc>>,
}

impl Coordinator {
    pub fn new(devices: Devices) -> Self {
        let (status, _) = watch::channel(CoordinatorStatus::Starting);
        let (hazard, _) = watch::channel(HazardState::clear(Instant::now()));
        Self {
            devices: Some(devices),
            status,
            hazard,
            queue: FeedbackQueue::new(),
            counters: Arc::new(PipelineCounters::default()),
            sensing_cancel: CancellationToken::new(),
            dispatch_cancel: CancellationToken::new(),
            tasks: None,
            started_at: None,
        }
    }

    /// Validate `config`, prime the sensors and spawn the pipeline tasks.
    ///
    /// Any error leaves the coordinator `Stopped` with its devices released.
    /// Must be called from within a Tokio runtime.
    pub async fn start(&mut self, config: CanneConfig) -> Result<(), StartupError> {
        if self.status() != CoordinatorStatus::Starting {
            return Err(StartupError::AlreadyStarted);
        }
        let Some(devices) = self.devices.take() else {
            return Err(StartupError::AlreadyStarted);
        };

        if let Err(e) = config.validate() {
            error!(error = %e, "Refusing to start with invalid configuration");
            self.set_status(CoordinatorStatus::Stopped);
            return Err(StartupError::Config(e));
        }

        info!(
            device = %config.device.name,
            danger_cm = config.range.danger_distance_cm,
            warning_cm = config.range.warning_distance_cm,
            vision = config.vision.enabled,
            "Starting coordinator"
        );

        let Devices {
            range: mut range_source,
            vision,
            audio,
            haptic,
        } = devices;

        // Prime the range sensor: a timeout is tolerated, a fatal error is not
        let primed_reading = match tokio::time::timeout(config.range.read_timeout(), range_source.read()).await {
            Ok(Ok(reading)) => reading,
            Ok(Err(SensorError::Fatal(reason))) => {
                return Err(self.fail_startup(range_source.source_name(), reason));
            }
            Ok(Err(SensorError::Timeout(reason))) => {
                warn!(reason = %reason, "Range priming read timed out, continuing");
                SensorReading::invalid(Instant::now())
            }
            Err(_) => {
                warn!("Range priming read timed out, continuing");
                SensorReading::invalid(Instant::now())
            }
        };

        let vision = match (config.vision.enabled, vision) {
            (true, Some(source)) => Some(source),
            (true, None) => {
                warn!("Vision enabled but no camera attached, running range-only");
                None
            }
            (false, Some(_)) => {
                info!("Vision disabled by configuration, camera released");
                None
            }
            (false, None) => None,
        };

        // Prime vision the same way
        let now = Instant::now();
        let mut detection_filter = DetectionFilter::new(&config.vision, now);
        let mut primed_vision: Option<FilteredDetections> = None;
        let vision = match vision {
            Some(mut source) => {
                match prime_vision(&mut source, config.vision.poll_timeout()).await {
                    Ok(Some(frame)) => {
                        primed_vision = Some(detection_filter.filter(frame, Instant::now()));
                    }
                    Ok(None) => {
                        detection_filter.record_failure(Instant::now());
                    }
                    Err(reason) => {
                        return Err(self.fail_startup(source.source_name(), reason));
                    }
                }
                Some(source)
            }
            None => None,
        };

        let mut range_filter = RangeFilter::new(&config.range, now);
        let primed_range = range_filter.push(primed_reading);

        // Wire the tasks
        let (events_tx, events_rx) = mpsc::channel::<FusionEvent>(FUSION_CHANNEL_CAPACITY);

        let range_task = RangePoller::new(
            range_source,
            range_filter,
            config.range.poll_interval(),
            config.range.read_timeout(),
            events_tx.clone(),
            self.sensing_cancel.clone(),
            Arc::clone(&self.counters),
        );
        let vision_task = vision.map(|source| {
            VisionPoller::new(
                source,
                detection_filter,
                config.vision.poll_interval(),
                config.vision.poll_timeout(),
                events_tx.clone(),
                self.sensing_cancel.clone(),
                Arc::clone(&self.counters),
            )
        });
        drop(events_tx);

        let fusion = FusionLoop::new(
            AlertArbiter::new(&config),
            self.queue.clone(),
            events_rx,
            self.hazard.clone(),
            Arc::clone(&self.counters),
        )
        .with_initial(primed_range, primed_vision);

        let queue = self.queue.clone();
        let dispatch_cancel = self.dispatch_cancel.clone();
        let grace = config.feedback.drain_grace();

        self.tasks = Some(RunningTasks {
            dispatcher: tokio::spawn(async move {
                queue.run(audio, haptic, dispatch_cancel, grace).await;
            }),
            fusion: tokio::spawn(fusion.run()),
            range: tokio::spawn(range_task.run()),
            vision: vision_task.map(|task| tokio::spawn(task.run())),
        });

        self.started_at = Some(Utc::now());
        self.set_status(CoordinatorStatus::Running);
        info!("Coordinator running");
        Ok(())
    }

    /// Stop sensing, drain fusion and feedback, release the devices.
    ///
    /// Idempotent; returns the final statistics.
    pub async fn stop(&mut self) -> CoordinatorStats {
        match self.tasks.take() {
            Some(tasks) => {
                self.set_status(CoordinatorStatus::Draining);
                info!("Draining coordinator");

                self.sensing_cancel.cancel();
                join("range poller", tasks.range).await;
                if let Some(vision) = tasks.vision {
                    join("vision poller", vision).await;
                }
                join("fusion", tasks.fusion).await;

                self.dispatch_cancel.cancel();
                join("feedback dispatcher", tasks.dispatcher).await;
            }
            None => {
                // Never started: just release the devices
                self.devices = None;
            }
        }

        self.set_status(CoordinatorStatus::Stopped);
        let stats = self.stats();
        info!(
            range_cycles = stats.range_cycles,
            evaluations = stats.evaluations,
            commands_issued = stats.commands_issued,
            dispatched = stats.queue.dispatched,
            "Coordinator stopped"
        );
        stats
    }

    pub fn status(&self) -> CoordinatorStatus {
        *self.status.borrow()
    }

    /// Receiver notified on every lifecycle transition.
    pub fn subscribe_status(&self) -> watch::Receiver<CoordinatorStatus> {
        self.status.subscribe()
    }

    /// Latest fused hazard snapshot.
    pub fn hazard(&self) -> HazardState {
        self.hazard.borrow().clone()
    }

    /// Receiver notified when the hazard changes (severity, distance or label).
    pub fn subscribe_hazard(&self) -> watch::Receiver<HazardState> {
        self.hazard.subscribe()
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats::collect(self.status(), self.started_at, &self.counters, self.queue.stats())
    }

    fn set_status(&self, status: CoordinatorStatus) {
        self.status.send_replace(status);
    }

    fn fail_startup(&self, source: &str, reason: String) -> StartupError {
        error!(source, reason = %reason, "Sensor failed during startup");
        self.set_status(CoordinatorStatus::Stopped);
        StartupError::SensorFatal {
            source_name: source.to_string(),
            reason,
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.sensing_cancel.cancel();
        self.dispatch_cancel.cancel();
    }
}

/// One priming poll. `Ok(None)` is a tolerated timeout, `Err` a fatal failure.
async fn prime_vision(
    source: &mut Box<dyn VisionSource>,
    timeout: Duration,
) -> Result<Option<Vec<crate::types::DetectionResult>>, String> {
    match tokio::time::timeout(timeout, source.poll()).await {
        Ok(Ok(frame)) => Ok(Some(frame)),
        Ok(Err(SensorError::Fatal(reason))) => Err(reason),
        Ok(Err(SensorError::Timeout(reason))) => {
            warn!(reason = %reason, "Vision priming poll timed out, continuing");
            Ok(None)
        }
        Err(_) => {
            warn!("Vision priming poll timed out, continuing");
            Ok(None)
        }
    }
}

async fn join(name: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!(task = name, error = %e, "Pipeline task ended abnormally");
    }
}
