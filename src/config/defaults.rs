//! System-wide default constants.
//!
//! Values that are not operator-tunable but are shared between modules.
//! Tunable thresholds live in `CanneConfig`.

// ============================================================================
// Config Loading
// ============================================================================

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "CANNE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "canne.toml";

// ============================================================================
// Physical Limits
// ============================================================================

/// Farthest echo an ultrasonic transducer of this class can resolve (cm).
pub const MAX_SENSOR_RANGE_CM: f64 = 400.0;

/// Largest moving-median window accepted; more samples lag too far behind
/// a walking user at 10 Hz.
pub const MAX_MEDIAN_WINDOW: usize = 15;

// ============================================================================
// Pipeline
// ============================================================================

/// Capacity of the poller → fusion channel (filtered updates).
///
/// 32 updates = ~3 s of range cycles at 10 Hz.
pub const FUSION_CHANNEL_CAPACITY: usize = 32;

/// Cycle-time warning threshold for one fusion evaluation (ms).
pub const FUSION_CYCLE_WARN_MS: u128 = 20;

// ============================================================================
// Output Devices
// ============================================================================

/// Speaking rate used to estimate how long a spoken message takes (chars/s).
pub const SPEECH_CHARS_PER_SEC: f64 = 15.0;

/// Minimum time a spoken message occupies the speaker (ms).
pub const MIN_SPEECH_MS: u64 = 400;
