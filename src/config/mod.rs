//! Canne Configuration Module
//!
//! Per-device configuration loaded from TOML files, replacing hardcoded
//! alert thresholds with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `CANNE_CONFIG` environment variable (path to TOML file)
//! 2. `canne.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded config is passed by value to `Coordinator::start`; there is no
//! process-wide global, so several coordinators (and tests) can run side by side.

mod canne_config;
pub mod defaults;
pub mod validation;

pub use canne_config::*;
pub use validation::ValidationWarning;
