//! Hazard severity and the fused hazard snapshot.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Ordered hazard classification: `None < Info < Warning < Danger`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub enum Severity {
    #[default]
    None = 0,
    Info = 1,
    Warning = 2,
    Danger = 3,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::None => write!(f, "NONE"),
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Danger => write!(f, "DANGER"),
        }
    }
}

/// What is dangerous right now, recomputed on every fusion cycle.
///
/// Owned by the arbiter; everything downstream only ever sees clones.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardState {
    pub severity: Severity,
    /// Distance the severity was derived from: the filtered range, or the
    /// detection's own estimate when vision alone raised a Warning
    pub distance_cm: Option<f64>,
    /// Label of the detection associated with the hazard, if any
    pub object_label: Option<String>,
    pub timestamp: Instant,
}

impl HazardState {
    /// The "nothing to report" state.
    pub fn clear(timestamp: Instant) -> Self {
        Self {
            severity: Severity::None,
            distance_cm: None,
            object_label: None,
            timestamp,
        }
    }
}
