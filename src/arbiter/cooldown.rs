//! Per-severity alert cooldown tracker

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CooldownConfig;
use crate::types::Severity;

/// Remembers when each severity last produced a command.
#[derive(Debug, Clone)]
pub struct CooldownTracker {
    windows: HashMap<Severity, Duration>,
    last_issued: HashMap<Severity, Instant>,
}

impl CooldownTracker {
    pub fn new(config: &CooldownConfig) -> Self {
        let windows = HashMap::from([
            (Severity::Danger, Duration::from_millis(config.danger_ms)),
            (Severity::Warning, Duration::from_millis(config.warning_ms)),
            (Severity::Info, Duration::from_millis(config.info_ms)),
        ]);
        Self {
            windows,
            last_issued: HashMap::new(),
        }
    }

    /// Whether `severity` may issue at `now`: never issued, or its window elapsed.
    pub fn is_ready(&self, severity: Severity, now: Instant) -> bool {
        self.remaining(severity, now).is_zero()
    }

    /// Time left before `severity` may issue again.
    pub fn remaining(&self, severity: Severity, now: Instant) -> Duration {
        let window = self.windows.get(&severity).copied().unwrap_or_default();
        match self.last_issued.get(&severity) {
            Some(last) => window.saturating_sub(now.saturating_duration_since(*last)),
            None => Duration::ZERO,
        }
    }

    /// Start the window for `severity`, returning the instant it replaces.
    pub fn record(&mut self, severity: Severity, now: Instant) -> Option<Instant> {
        self.last_issued.insert(severity, now)
    }

    /// Put back the timer `record` replaced.
    pub fn restore(&mut self, severity: Severity, previous: Option<Instant>) {
        match previous {
            Some(at) => self.last_issued.insert(severity, at),
            None => self.last_issued.remove(&severity),
        };
    }

    /// Forget the timers of every level strictly above `severity`.
    pub fn clear_above(&mut self, severity: Severity) {
        self.last_issued.retain(|level, _| *level <= severity);
    }
}
