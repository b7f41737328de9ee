//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::defaults::{MAX_MEDIAN_WINDOW, MAX_SENSOR_RANGE_CM};

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `CanneConfig`.
///
/// Maintained by hand alongside canne_config.rs; a new field needs an entry here.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [device]
        "device",
        "device.name",
        "device.language",
        // [range]
        "range",
        "range.max_distance_cm",
        "range.danger_distance_cm",
        "range.warning_distance_cm",
        "range.hysteresis_cm",
        "range.poll_interval_ms",
        "range.read_timeout_ms",
        "range.median_window",
        "range.stale_timeout_ms",
        // [vision]
        "vision",
        "vision.enabled",
        "vision.poll_interval_ms",
        "vision.poll_timeout_ms",
        "vision.confidence_floor",
        "vision.high_confidence",
        "vision.max_detections",
        "vision.detection_max_age_ms",
        "vision.stale_timeout_ms",
        // [cooldown]
        "cooldown",
        "cooldown.danger_ms",
        "cooldown.warning_ms",
        "cooldown.info_ms",
        // [feedback]
        "feedback",
        "feedback.audio_enabled",
        "feedback.haptic_enabled",
        "feedback.haptic_intensity",
        "feedback.drain_grace_ms",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Dotted path of every key in a parsed TOML document, tables before their
/// children: `{ range = { danger_distance_cm = 40 } }` gives
/// `["range", "range.danger_distance_cm"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    value
        .as_table()
        .into_iter()
        .flatten()
        .flat_map(|(key, child)| {
            let path = match prefix {
                "" => key.clone(),
                _ => format!("{prefix}.{key}"),
            };
            let nested = walk_toml_keys(child, &path);
            std::iter::once(path).chain(nested)
        })
        .collect()
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Never fails: syntax errors are left for the serde pass to report.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Physical Range Validation
// ============================================================================

/// Validate physical ranges on a parsed `CanneConfig`.
///
/// Returns (errors, warnings): errors are impossible values that must
/// prevent startup; warnings are suspicious but not fatal.
pub fn validate_physical_ranges(
    config: &super::CanneConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let r = &config.range;

    // HC-SR04 class transducers top out around 4 m
    if r.max_distance_cm <= 0.0 || r.max_distance_cm > MAX_SENSOR_RANGE_CM {
        errors.push(format!(
            "range.max_distance_cm = {:.1} is outside physical range (0-{:.0} cm)",
            r.max_distance_cm, MAX_SENSOR_RANGE_CM
        ));
    }
    if r.danger_distance_cm > r.max_distance_cm {
        errors.push(format!(
            "range.danger_distance_cm = {:.1} exceeds max_distance_cm = {:.1}; clamped readings would always be Danger",
            r.danger_distance_cm, r.max_distance_cm
        ));
    }
    if r.median_window > MAX_MEDIAN_WINDOW {
        errors.push(format!(
            "range.median_window = {} is larger than {} samples",
            r.median_window, MAX_MEDIAN_WINDOW
        ));
    }

    if r.warning_distance_cm > r.max_distance_cm {
        warnings.push(ValidationWarning {
            field: "range.warning_distance_cm".to_string(),
            message: format!(
                "warning_distance_cm = {:.1} is beyond max_distance_cm = {:.1}; every echo will raise a Warning",
                r.warning_distance_cm, r.max_distance_cm
            ),
            suggestion: None,
        });
    }
    if r.read_timeout_ms > r.stale_timeout_ms {
        warnings.push(ValidationWarning {
            field: "range.read_timeout_ms".to_string(),
            message: format!(
                "read_timeout_ms = {} is longer than stale_timeout_ms = {}; a single stuck read marks the range unavailable",
                r.read_timeout_ms, r.stale_timeout_ms
            ),
            suggestion: None,
        });
    }

    let c = &config.cooldown;
    if c.danger_ms > c.info_ms || c.danger_ms > c.warning_ms {
        warnings.push(ValidationWarning {
            field: "cooldown.danger_ms".to_string(),
            message: format!(
                "cooldown.danger_ms = {} is longer than a lower-severity cooldown (warning {}, info {})",
                c.danger_ms, c.warning_ms, c.info_ms
            ),
            suggestion: None,
        });
    }

    let v = &config.vision;
    if v.enabled && v.poll_interval_ms < r.poll_interval_ms {
        warnings.push(ValidationWarning {
            field: "vision.poll_interval_ms".to_string(),
            message: format!(
                "vision.poll_interval_ms = {} polls faster than range.poll_interval_ms = {}",
                v.poll_interval_ms, r.poll_interval_ms
            ),
            suggestion: None,
        });
    }
    if v.enabled && v.detection_max_age_ms < v.poll_interval_ms {
        warnings.push(ValidationWarning {
            field: "vision.detection_max_age_ms".to_string(),
            message: format!(
                "detection_max_age_ms = {} is shorter than the vision poll interval ({} ms); labels will rarely be current",
                v.detection_max_age_ms, v.poll_interval_ms
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
