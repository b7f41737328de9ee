//! Canne Configuration - every alerting threshold as an operator-tunable TOML value
//!
//! Each section implements `Default` with the documented safe defaults, so a
//! missing file (or a file that only sets a handful of keys) behaves exactly
//! like the factory configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults::{CONFIG_ENV_VAR, LOCAL_CONFIG_FILE};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one cane.
///
/// Load with `CanneConfig::load()` which searches:
/// 1. `$CANNE_CONFIG` env var
/// 2. `./canne.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanneConfig {
    /// Device identification and speech language
    #[serde(default)]
    pub device: DeviceConfig,

    /// Ultrasonic ranging thresholds and polling
    #[serde(default)]
    pub range: RangeConfig,

    /// Camera detection filtering and polling
    #[serde(default)]
    pub vision: VisionConfig,

    /// Per-severity alert cooldowns
    #[serde(default)]
    pub cooldown: CooldownConfig,

    /// Output channels and shutdown grace
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

impl CanneConfig {
    /// Load configuration using the standard search order:
    /// 1. `$CANNE_CONFIG` environment variable
    /// 2. `./canne.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), device = %config.device.name, "Loaded config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./canne.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(device = %config.device.name, "Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are reported as warnings only; value errors are fatal.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in &super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - Danger distance must not exceed the warning distance
    /// - Hysteresis must keep the danger band inside the warning band
    /// - Confidences must lie in [0, 1], high confidence >= floor
    /// - Intervals, timeouts and window sizes must be > 0
    /// - At least one output channel must be enabled
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.range;
        let v = &self.vision;
        let mut errors: Vec<String> = Vec::new();

        // Range: warning band must contain the danger band
        Self::check_escalation(
            r.danger_distance_cm,
            r.warning_distance_cm,
            "range.danger_distance_cm / range.warning_distance_cm",
            &mut errors,
        );
        if r.danger_distance_cm <= 0.0 {
            errors.push("range.danger_distance_cm must be > 0".to_string());
        }
        if r.hysteresis_cm < 0.0 {
            errors.push("range.hysteresis_cm cannot be negative".to_string());
        } else if r.hysteresis_cm > 0.0 && r.danger_distance_cm + r.hysteresis_cm >= r.warning_distance_cm {
            errors.push(format!(
                "range.hysteresis_cm ({:.1}) pushes the danger band ({:.1} cm) past warning_distance_cm ({:.1})",
                r.hysteresis_cm,
                r.danger_distance_cm + r.hysteresis_cm,
                r.warning_distance_cm
            ));
        }
        if r.median_window == 0 {
            errors.push("range.median_window must be > 0".to_string());
        }
        if r.poll_interval_ms == 0 {
            errors.push("range.poll_interval_ms must be > 0".to_string());
        }
        if r.read_timeout_ms == 0 {
            errors.push("range.read_timeout_ms must be > 0".to_string());
        }
        if r.stale_timeout_ms == 0 {
            errors.push("range.stale_timeout_ms must be > 0".to_string());
        }

        // Vision: confidences are probabilities
        for (name, value) in [
            ("vision.confidence_floor", v.confidence_floor),
            ("vision.high_confidence", v.high_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("{name} = {value} must lie in [0, 1]"));
            }
        }
        if v.high_confidence < v.confidence_floor {
            errors.push(format!(
                "vision.high_confidence ({:.2}) must be >= confidence_floor ({:.2})",
                v.high_confidence, v.confidence_floor
            ));
        }
        if v.enabled {
            if v.poll_interval_ms == 0 {
                errors.push("vision.poll_interval_ms must be > 0".to_string());
            }
            if v.poll_timeout_ms == 0 {
                errors.push("vision.poll_timeout_ms must be > 0".to_string());
            }
            if v.max_detections == 0 {
                errors.push("vision.max_detections must be > 0".to_string());
            }
        }

        // Feedback: something must reach the user
        let f = &self.feedback;
        if !f.audio_enabled && !f.haptic_enabled {
            errors.push("feedback: at least one of audio_enabled / haptic_enabled must be true".to_string());
        }
        if !(0.0..=1.0).contains(&f.haptic_intensity) {
            errors.push(format!(
                "feedback.haptic_intensity = {} must lie in [0, 1]",
                f.haptic_intensity
            ));
        }

        // Physical range validation
        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        // Reject NaN/Inf in any config value (sweep all f64 fields via serialization)
        if let Ok(ref s) = toml::to_string(self) {
            let non_finite = s.lines().any(|line| {
                line.split_once('=').is_some_and(|(_, value)| {
                    matches!(value.trim(), "nan" | "+nan" | "-nan" | "inf" | "+inf" | "-inf")
                })
            });
            if non_finite {
                errors.push("Config contains NaN or Inf values, all thresholds must be finite numbers".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_escalation(inner: f64, outer: f64, name: &str, errors: &mut Vec<String>) {
        // NaN/Inf comparisons silently pass
        if !inner.is_finite() || !outer.is_finite() {
            errors.push(format!(
                "{name}: values must be finite (got danger={inner}, warning={outer})"
            ));
            return;
        }
        if outer < inner {
            errors.push(format!(
                "{name}: warning ({outer:.1}) must be >= danger ({inner:.1})"
            ));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Device
// ============================================================================

/// Spoken language for alert messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "fr")]
    French,
}

/// Device identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Human-readable device name (shown in logs)
    #[serde(default = "default_device_name")]
    pub name: String,

    /// Language used for spoken alerts
    #[serde(default)]
    pub language: Language,
}

fn default_device_name() -> String {
    "Canne-Smart".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            language: Language::default(),
        }
    }
}

// ============================================================================
// Range
// ============================================================================

/// Ultrasonic ranging thresholds, filtering and polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConfig {
    /// Echoes beyond this distance are clamped to it (cm).
    #[serde(default = "default_max_distance")]
    pub max_distance_cm: f64,

    /// At or below this distance the hazard is Danger (cm).
    #[serde(default = "default_danger_distance")]
    pub danger_distance_cm: f64,

    /// At or below this distance the hazard is Warning (cm).
    #[serde(default = "default_warning_distance")]
    pub warning_distance_cm: f64,

    /// Extra distance a held Danger/Warning level must clear before it
    /// de-escalates (cm). 0 disables hysteresis.
    #[serde(default)]
    pub hysteresis_cm: f64,

    /// Range polling interval (ms). 100 ms = 10 Hz.
    #[serde(default = "default_range_poll_interval")]
    pub poll_interval_ms: u64,

    /// Upper bound on a single read before it counts as a failed echo (ms).
    #[serde(default = "default_range_read_timeout")]
    pub read_timeout_ms: u64,

    /// Number of valid samples in the moving median.
    #[serde(default = "default_median_window")]
    pub median_window: usize,

    /// Without a valid reading for this long the range is unavailable (ms).
    #[serde(default = "default_range_stale_timeout")]
    pub stale_timeout_ms: u64,
}

fn default_max_distance() -> f64 { 300.0 }
fn default_danger_distance() -> f64 { 50.0 }
fn default_warning_distance() -> f64 { 100.0 }
fn default_range_poll_interval() -> u64 { 100 }
fn default_range_read_timeout() -> u64 { 150 }
fn default_median_window() -> usize { 5 }
fn default_range_stale_timeout() -> u64 { 1_000 }

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            max_distance_cm: default_max_distance(),
            danger_distance_cm: default_danger_distance(),
            warning_distance_cm: default_warning_distance(),
            hysteresis_cm: 0.0,
            poll_interval_ms: default_range_poll_interval(),
            read_timeout_ms: default_range_read_timeout(),
            median_window: default_median_window(),
            stale_timeout_ms: default_range_stale_timeout(),
        }
    }
}

impl RangeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }
}

// ============================================================================
// Vision
// ============================================================================

/// Camera detection filtering and polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Whether the camera pipeline runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Vision polling interval (ms). Inference takes hundreds of ms.
    #[serde(default = "default_vision_poll_interval")]
    pub poll_interval_ms: u64,

    /// Upper bound on capture + inference before the poll counts as failed (ms).
    #[serde(default = "default_vision_poll_timeout")]
    pub poll_timeout_ms: u64,

    /// Detections below this confidence are discarded.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,

    /// Detections at or above this confidence can raise a Warning on their own.
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f64,

    /// At most this many detections are kept (and announced) per frame.
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Detections older than this no longer describe the scene (ms).
    #[serde(default = "default_detection_max_age")]
    pub detection_max_age_ms: u64,

    /// Without a successful poll for this long vision is unavailable (ms).
    #[serde(default = "default_vision_stale_timeout")]
    pub stale_timeout_ms: u64,
}

fn default_true() -> bool { true }
fn default_vision_poll_interval() -> u64 { 1_000 }
fn default_vision_poll_timeout() -> u64 { 2_000 }
fn default_confidence_floor() -> f64 { 0.5 }
fn default_high_confidence() -> f64 { 0.8 }
fn default_max_detections() -> usize { 5 }
fn default_detection_max_age() -> u64 { 2_500 }
fn default_vision_stale_timeout() -> u64 { 5_000 }

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            poll_interval_ms: default_vision_poll_interval(),
            poll_timeout_ms: default_vision_poll_timeout(),
            confidence_floor: default_confidence_floor(),
            high_confidence: default_high_confidence(),
            max_detections: default_max_detections(),
            detection_max_age_ms: default_detection_max_age(),
            stale_timeout_ms: default_vision_stale_timeout(),
        }
    }
}

impl VisionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn detection_max_age(&self) -> Duration {
        Duration::from_millis(self.detection_max_age_ms)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }
}

// ============================================================================
// Cooldown
// ============================================================================

/// Minimum spacing between two issued alerts of the same severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    #[serde(default = "default_danger_cooldown")]
    pub danger_ms: u64,

    #[serde(default = "default_warning_cooldown")]
    pub warning_ms: u64,

    #[serde(default = "default_info_cooldown")]
    pub info_ms: u64,
}

fn default_danger_cooldown() -> u64 { 1_000 }
fn default_warning_cooldown() -> u64 { 3_000 }
fn default_info_cooldown() -> u64 { 5_000 }

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            danger_ms: default_danger_cooldown(),
            warning_ms: default_warning_cooldown(),
            info_ms: default_info_cooldown(),
        }
    }
}

// ============================================================================
// Feedback
// ============================================================================

/// Output channels and shutdown behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Speak alerts.
    #[serde(default = "default_true")]
    pub audio_enabled: bool,

    /// Vibrate alerts.
    #[serde(default = "default_true")]
    pub haptic_enabled: bool,

    /// Motor drive level applied to every pattern, in [0, 1].
    #[serde(default = "default_haptic_intensity")]
    pub haptic_intensity: f32,

    /// How long an in-flight output may keep playing after shutdown (ms).
    #[serde(default = "default_drain_grace")]
    pub drain_grace_ms: u64,
}

fn default_haptic_intensity() -> f32 { 1.0 }
fn default_drain_grace() -> u64 { 1_500 }

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            audio_enabled: default_true(),
            haptic_enabled: default_true(),
            haptic_intensity: default_haptic_intensity(),
            drain_grace_ms: default_drain_grace(),
        }
    }
}

impl FeedbackConfig {
    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================
