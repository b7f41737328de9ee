//! Coordinator lifecycle status and run statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::feedback::QueueStats;

// ============================================================================
// Lifecycle
// ============================================================================

/// Coordinator lifecycle: `Starting → Running → Draining → Stopped`.
///
/// A failed start goes straight from `Starting` to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CoordinatorStatus {
    /// Devices attached, nothing running yet
    #[default]
    Starting,
    /// Sensing, fusing and dispatching
    Running,
    /// Sensing stopped, in-flight work finishing
    Draining,
    /// All tasks joined, devices released
    Stopped,
}

impl std::fmt::Display for CoordinatorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorStatus::Starting => write!(f, "Starting"),
            CoordinatorStatus::Running => write!(f, "Running"),
            CoordinatorStatus::Draining => write!(f, "Draining"),
            CoordinatorStatus::Stopped => write!(f, "Stopped"),
        }
    }
}

// ============================================================================
// Counters
// ============================================================================

/// Counters shared by the pipeline tasks.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub range_cycles: AtomicU64,
    pub range_read_errors: AtomicU64,
    pub range_unavailable_episodes: AtomicU64,
    pub vision_cycles: AtomicU64,
    pub vision_failures: AtomicU64,
    pub evaluations: AtomicU64,
    pub commands_issued: AtomicU64,
}

impl PipelineCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of a coordinator run.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStats {
    pub status: CoordinatorStatus,
    /// Wall-clock time the coordinator entered `Running`
    pub started_at: Option<DateTime<Utc>>,
    pub range_cycles: u64,
    /// Reads that errored or timed out
    pub range_read_errors: u64,
    pub range_unavailable_episodes: u64,
    pub vision_cycles: u64,
    pub vision_failures: u64,
    /// Fusion cycles run by the arbiter
    pub evaluations: u64,
    /// Commands the arbiter handed to the feedback queue
    pub commands_issued: u64,
    pub queue: QueueStats,
}

impl CoordinatorStats {
    pub fn collect(
        status: CoordinatorStatus,
        started_at: Option<DateTime<Utc>>,
        counters: &PipelineCounters,
        queue: QueueStats,
    ) -> Self {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        Self {
            status,
            started_at,
            range_cycles: load(&counters.range_cycles),
            range_read_errors: load(&counters.range_read_errors),
            range_unavailable_episodes: load(&counters.range_unavailable_episodes),
            vision_cycles: load(&counters.vision_cycles),
            vision_failures: load(&counters.vision_failures),
            evaluations: load(&counters.evaluations),
            commands_issued: load(&counters.commands_issued),
            queue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_default_and_display() {
        assert_eq!(CoordinatorStatus::default(), CoordinatorStatus::Starting);
        assert_eq!(format!("{}", CoordinatorStatus::Draining), "Draining");
    }

    #[test]
    fn test_stats_snapshot_reads_counters() {
        let counters = PipelineCounters::default();
        PipelineCounters::incr(&counters.range_cycles);
        PipelineCounters::incr(&counters.range_cycles);
        PipelineCounters::incr(&counters.commands_issued);
        let stats = CoordinatorStats::collect(CoordinatorStatus::Running, None, &counters, QueueStats::default());
        assert_eq!(stats.range_cycles, 2);
        assert_eq!(stats.commands_issued, 1);
        assert_eq!(stats.status, CoordinatorStatus::Running);
    }

    #[test]
    fn test_stats_serialize_to_json() {
        let stats = CoordinatorStats::collect(
            CoordinatorStatus::Stopped,
            Some(Utc::now()),
            &PipelineCounters::default(),
            QueueStats::default(),
        );
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["status"], "Stopped");
        assert_eq!(json["queue"]["dispatched"], 0);
    }
}
