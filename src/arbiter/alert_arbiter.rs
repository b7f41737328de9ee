//! Alert Arbiter - fuses filtered range and vision into one hazard and
//! decides whether it is worth interrupting the user for.
//!
//! Severity policy (range first, proximity is the time-critical signal):
//! 1. range ≤ danger distance → Danger
//! 2. range ≤ warning distance → Warning
//! 3. confident detection estimated within the warning distance → Warning
//! 4. any current detection → Info
//! 5. otherwise → None
//!
//! A current detection's label enriches range-derived levels. Commands are
//! rate-limited per severity; an escalation always goes out immediately.
//! A command the feedback queue refuses is handed back through
//! [`AlertArbiter::on_rejected`] so it does not count as delivered.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::cooldown::CooldownTracker;
use super::messages::Messages;
use crate::config::CanneConfig;
use crate::feedback::patterns::pattern_for;
use crate::filter::{FilteredDetections, FilteredRange};
use crate::types::{FeedbackCommand, HazardState, OutputChannel, Severity};

/// Result of one fusion cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub state: HazardState,
    /// At most one command per cycle
    pub command: Option<FeedbackCommand>,
}

/// Why a level was assigned; drives the spoken message.
#[derive(Debug, Clone, PartialEq)]
enum Finding {
    Clear,
    Range { severity: Severity, distance_cm: f64 },
    Vision { label: String, distance_cm: Option<f64> },
    Noticed,
}

/// What the most recent command changed, so a refusal can be undone.
#[derive(Debug, Clone, Copy)]
struct IssuedRecord {
    id: u64,
    severity: Severity,
    replaced: Option<Instant>,
    notice: bool,
}

pub struct AlertArbiter {
    danger_distance_cm: f64,
    warning_distance_cm: f64,
    hysteresis_cm: f64,
    high_confidence: f64,
    detection_max_age: Duration,
    haptic_intensity: f32,
    alert_channel: OutputChannel,
    notice_channel: OutputChannel,
    messages: Messages,

    cooldowns: CooldownTracker,
    /// Severity of the previous evaluation
    last_severity: Severity,
    /// Level the range alone held last cycle, for hysteresis
    last_range_severity: Severity,
    /// Both sources currently unavailable
    unavailable_episode: bool,
    unavailable_notified: bool,
    last_issued: Option<IssuedRecord>,
    next_id: u64,
}

impl AlertArbiter {
    pub fn new(config: &CanneConfig) -> Self {
        let f = &config.feedback;
        let alert_channel = match (f.audio_enabled, f.haptic_enabled) {
            (true, true) => OutputChannel::Both,
            (false, true) => OutputChannel::Haptic,
            _ => OutputChannel::Audio,
        };
        let notice_channel = if f.audio_enabled {
            OutputChannel::Audio
        } else {
            OutputChannel::Haptic
        };

        Self {
            danger_distance_cm: config.range.danger_distance_cm,
            warning_distance_cm: config.range.warning_distance_cm,
            hysteresis_cm: config.range.hysteresis_cm.max(0.0),
            high_confidence: config.vision.high_confidence,
            detection_max_age: config.vision.detection_max_age(),
            haptic_intensity: f.haptic_intensity,
            alert_channel,
            notice_channel,
            messages: Messages::new(config.device.language),
            cooldowns: CooldownTracker::new(&config.cooldown),
            last_severity: Severity::None,
            last_range_severity: Severity::None,
            unavailable_episode: false,
            unavailable_notified: false,
            last_issued: None,
            next_id: 1,
        }
    }

    /// Fuse the latest filtered inputs. `vision = None` means vision is
    /// unavailable (disabled, or failing for longer than its timeout).
    pub fn evaluate(
        &mut self,
        range: &FilteredRange,
        vision: Option<&FilteredDetections>,
        now: Instant,
    ) -> Assessment {
        let current = vision.filter(|v| !v.is_empty() && v.is_current(now, self.detection_max_age));
        let label = current
            .and_then(|v| v.representative())
            .map(|d| d.label.clone());

        let finding = self.classify(range.distance(), current);
        let severity = match &finding {
            Finding::Clear => Severity::None,
            Finding::Range { severity, .. } => *severity,
            Finding::Vision { .. } => Severity::Warning,
            Finding::Noticed => Severity::Info,
        };

        let (distance_cm, object_label) = match &finding {
            Finding::Vision { label, distance_cm } => (*distance_cm, Some(label.clone())),
            Finding::Clear => (range.distance(), None),
            _ => (range.distance(), label),
        };
        let state = HazardState {
            severity,
            distance_cm,
            object_label,
            timestamp: now,
        };

        let previous = self.last_severity;
        self.last_severity = severity;
        if severity < previous {
            self.cooldowns.clear_above(severity);
        }

        let command = if range.is_unavailable() && vision.is_none() {
            self.on_sensors_unavailable(now)
        } else {
            if self.unavailable_episode {
                info!("Sensors available again");
            }
            self.unavailable_episode = false;
            self.unavailable_notified = false;
            self.decide(&finding, &state, current, previous, now)
        };

        Assessment { state, command }
    }

    pub fn last_severity(&self) -> Severity {
        self.last_severity
    }

    /// The feedback queue refused `command`: its cooldown window and, for
    /// the sensors-unavailable notice, the episode flag are rolled back so
    /// the next cycle issues it again.
    pub fn on_rejected(&mut self, command: &FeedbackCommand) {
        let Some(record) = self.last_issued.filter(|r| r.id == command.id) else {
            return;
        };
        self.last_issued = None;
        self.cooldowns.restore(record.severity, record.replaced);
        if record.notice {
            self.unavailable_notified = false;
        }
        debug!(
            id = command.id,
            severity = %record.severity,
            "Rejected command rolled back"
        );
    }

    fn classify(&mut self, distance: Option<f64>, current: Option<&FilteredDetections>) -> Finding {
        let range_severity = match distance {
            Some(d) => self.range_level(d),
            None => Severity::None,
        };
        self.last_range_severity = range_severity;

        if let (Some(distance_cm), true) = (distance, range_severity > Severity::None) {
            return Finding::Range {
                severity: range_severity,
                distance_cm,
            };
        }

        let Some(frame) = current else {
            return Finding::Clear;
        };

        let confident_close = frame.detections.iter().find(|d| {
            d.confidence >= self.high_confidence && d.distance_or_far() <= self.warning_distance_cm
        });
        match confident_close {
            Some(d) => Finding::Vision {
                label: d.label.clone(),
                distance_cm: d.estimated_distance_cm,
            },
            None => Finding::Noticed,
        }
    }

    /// Range-only level, holding the previous level inside the hysteresis band.
    fn range_level(&self, d: f64) -> Severity {
        let held = self.hysteresis_cm > 0.0;
        if d <= self.danger_distance_cm
            || (held
                && self.last_range_severity == Severity::Danger
                && d <= self.danger_distance_cm + self.hysteresis_cm)
        {
            Severity::Danger
        } else if d <= self.warning_distance_cm
            || (held
                && self.last_range_severity >= Severity::Warning
                && d <= self.warning_distance_cm + self.hysteresis_cm)
        {
            Severity::Warning
        } else {
            Severity::None
        }
    }

    fn decide(
        &mut self,
        finding: &Finding,
        state: &HazardState,
        current: Option<&FilteredDetections>,
        previous: Severity,
        now: Instant,
    ) -> Option<FeedbackCommand> {
        let severity = state.severity;
        if severity == Severity::None {
            return None;
        }

        let escalation = severity > previous;
        if !escalation && !self.cooldowns.is_ready(severity, now) {
            debug!(
                severity = %severity,
                cooldown_remaining_ms = self.cooldowns.remaining(severity, now).as_millis() as u64,
                "Alert suppressed by cooldown"
            );
            return None;
        }

        let label = state.object_label.as_deref();
        let message = match finding {
            Finding::Range {
                severity: Severity::Danger,
                distance_cm,
            } => self.messages.danger(*distance_cm, label),
            Finding::Range { distance_cm, .. } => self.messages.range_warning(*distance_cm, label),
            Finding::Vision { label, .. } => self.messages.vision_warning(label),
            Finding::Noticed => self
                .messages
                .detection_summary(current.map(|v| v.detections.as_slice()).unwrap_or(&[])),
            Finding::Clear => return None,
        };

        let replaced = self.cooldowns.record(severity, now);
        let command = self.command(severity, self.alert_channel, message, now);
        self.last_issued = Some(IssuedRecord {
            id: command.id,
            severity,
            replaced,
            notice: false,
        });
        info!(
            id = command.id,
            severity = %severity,
            escalation,
            channel = %command.channel,
            distance_cm = state.distance_cm,
            label = state.object_label.as_deref().unwrap_or("-"),
            message = %command.message,
            "Alert issued"
        );
        Some(command)
    }

    fn on_sensors_unavailable(&mut self, now: Instant) -> Option<FeedbackCommand> {
        if !self.unavailable_episode {
            info!("Range and vision both unavailable");
            self.unavailable_episode = true;
        }
        if self.unavailable_notified {
            return None;
        }
        if !self.cooldowns.is_ready(Severity::Info, now) {
            debug!(
                cooldown_remaining_ms = self.cooldowns.remaining(Severity::Info, now).as_millis() as u64,
                "Sensors-unavailable notice deferred by Info cooldown"
            );
            return None;
        }

        self.unavailable_notified = true;
        let replaced = self.cooldowns.record(Severity::Info, now);
        let message = self.messages.sensors_unavailable();
        let command = self.command(Severity::Info, self.notice_channel, message, now);
        self.last_issued = Some(IssuedRecord {
            id: command.id,
            severity: Severity::Info,
            replaced,
            notice: true,
        });
        info!(id = command.id, "Sensors-unavailable notice issued");
        Some(command)
    }

    fn command(
        &mut self,
        severity: Severity,
        channel: OutputChannel,
        message: String,
        now: Instant,
    ) -> FeedbackCommand {
        let id = self.next_id;
        self.next_id += 1;
        FeedbackCommand {
            id,
            channel,
            message,
            pattern: pattern_for(severity, self.haptic_intensity),
            severity,
            issued_at: now,
        }
    }
}
