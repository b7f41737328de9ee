//! Haptic motifs per severity.
//!
//! Each level is recognisable by feel alone: Info is one medium buzz,
//! Warning two short ones, Danger three long ones.

use crate::types::{HapticPattern, Pulse, Severity};

const fn pulse(on_ms: u64, off_ms: u64) -> Pulse {
    Pulse { on_ms, off_ms }
}

const INFO: &[Pulse] = &[pulse(300, 0)];
const WARNING: &[Pulse] = &[pulse(200, 200), pulse(200, 200)];
const DANGER: &[Pulse] = &[pulse(500, 100), pulse(500, 100), pulse(500, 500)];

/// Pattern for `severity` at the given motor intensity (clamped to [0, 1]).
///
/// `Severity::None` maps to an empty pattern.
pub fn pattern_for(severity: Severity, intensity: f32) -> HapticPattern {
    let pulses = match severity {
        Severity::None => &[][..],
        Severity::Info => INFO,
        Severity::Warning => WARNING,
        Severity::Danger => DANGER,
    };
    HapticPattern {
        pulses: pulses.to_vec(),
        intensity: intensity.clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_patterns_are_distinguishable() {
        assert_eq!(pattern_for(Severity::Info, 1.0).pulses.len(), 1);
        assert_eq!(pattern_for(Severity::Warning, 1.0).pulses.len(), 2);
        assert_eq!(pattern_for(Severity::Danger, 1.0).pulses.len(), 3);
        assert!(pattern_for(Severity::None, 1.0).pulses.is_empty());
    }

    #[test]
    fn test_danger_duration() {
        assert_eq!(pattern_for(Severity::Danger, 0.5).duration(), Duration::from_millis(2_200));
    }

    #[test]
    fn test_intensity_is_clamped() {
        assert_eq!(pattern_for(Severity::Warning, 3.0).intensity, 1.0);
        assert_eq!(pattern_for(Severity::Warning, -1.0).intensity, 0.0);
    }
}
