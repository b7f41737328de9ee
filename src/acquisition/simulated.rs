//! Seeded simulations of the range and vision devices.
//!
//! The range simulation walks the user toward an obstacle and back out
//! again, with Gaussian echo noise, occasional single-sample spikes (stray
//! reflections) and dropouts (absorbed pulses). Runs with the same seed
//! produce the same readings.

use async_trait::async_trait;
use rand::prelude::*;
use rand_distr::StandardNormal;
use std::time::Duration;
use tokio::time::Instant;

use super::{RangeSource, SensorError, VisionSource};
use crate::types::{DetectionResult, SensorReading};

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

// ============================================================================
// Range
// ============================================================================

/// Simulated ultrasonic sensor.
pub struct SimulatedRangeSource {
    rng: StdRng,
    /// True distance to the obstacle (cm)
    position_cm: f64,
    /// Approach speed per read (cm, negative = approaching)
    step_cm: f64,
    nearest_cm: f64,
    farthest_cm: f64,
    noise_sigma_cm: f64,
    spike_probability: f64,
    dropout_probability: f64,
}

impl SimulatedRangeSource {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: seeded_rng(seed),
            position_cm: 250.0,
            // ~0.8 m/s walking pace at 10 Hz
            step_cm: -8.0,
            nearest_cm: 25.0,
            farthest_cm: 280.0,
            noise_sigma_cm: 2.0,
            spike_probability: 0.03,
            dropout_probability: 0.05,
        }
    }

    /// Override the walk bounds (cm).
    pub fn with_walk(mut self, nearest_cm: f64, farthest_cm: f64, step_cm: f64) -> Self {
        self.nearest_cm = nearest_cm.min(farthest_cm);
        self.farthest_cm = farthest_cm.max(nearest_cm);
        self.position_cm = self.position_cm.clamp(self.nearest_cm, self.farthest_cm);
        self.step_cm = -step_cm.abs();
        self
    }

    /// Override noise characteristics.
    pub fn with_noise(mut self, sigma_cm: f64, spike_probability: f64, dropout_probability: f64) -> Self {
        self.noise_sigma_cm = sigma_cm.max(0.0);
        self.spike_probability = spike_probability.clamp(0.0, 1.0);
        self.dropout_probability = dropout_probability.clamp(0.0, 1.0);
        self
    }

    fn advance(&mut self) {
        self.position_cm += self.step_cm;
        if self.position_cm <= self.nearest_cm {
            self.position_cm = self.nearest_cm;
            self.step_cm = self.step_cm.abs();
        } else if self.position_cm >= self.farthest_cm {
            self.position_cm = self.farthest_cm;
            self.step_cm = -self.step_cm.abs();
        }
    }
}

#[async_trait]
impl RangeSource for SimulatedRangeSource {
    async fn read(&mut self) -> Result<SensorReading, SensorError> {
        self.advance();
        let now = Instant::now();

        if self.rng.gen_bool(self.dropout_probability) {
            return Ok(SensorReading::invalid(now));
        }

        let z: f64 = self.rng.sample(StandardNormal);
        let mut distance = self.position_cm + z * self.noise_sigma_cm;
        if self.rng.gen_bool(self.spike_probability) {
            distance += self.rng.gen_range(-150.0..150.0);
        }

        Ok(SensorReading::valid(distance.max(0.0), now))
    }

    fn source_name(&self) -> &str {
        "simulated-range"
    }
}

// ============================================================================
// Vision
// ============================================================================

const SIMULATED_LABELS: &[&str] = &["person", "chair", "bicycle", "car", "dog", "bench"];

/// Simulated camera + detector with an artificial inference delay.
pub struct SimulatedVisionSource {
    rng: StdRng,
    inference_delay: Duration,
    failure_probability: f64,
}

impl SimulatedVisionSource {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            // Distinct stream from the range simulation when both share a seed
            rng: seeded_rng(seed.map(|s| s.wrapping_add(0x5eed))),
            inference_delay: Duration::from_millis(350),
            failure_probability: 0.02,
        }
    }

    pub fn with_inference_delay(mut self, delay: Duration) -> Self {
        self.inference_delay = delay;
        self
    }
}

#[async_trait]
impl VisionSource for SimulatedVisionSource {
    async fn poll(&mut self) -> Result<Vec<DetectionResult>, SensorError> {
        let captured_at = Instant::now();
        tokio::time::sleep(self.inference_delay).await;

        if self.rng.gen_bool(self.failure_probability) {
            return Err(SensorError::Timeout("camera returned no frame".to_string()));
        }

        let count = self.rng.gen_range(0..=3);
        let detections = (0..count)
            .map(|_| {
                let label = SIMULATED_LABELS[self.rng.gen_range(0..SIMULATED_LABELS.len())];
                let confidence = self.rng.gen_range(0.3..0.99);
                let distance = if self.rng.gen_bool(0.7) {
                    Some(self.rng.gen_range(40.0..400.0))
                } else {
                    None
                };
                DetectionResult::new(label, confidence, distance, captured_at)
            })
            .collect();
        Ok(detections)
    }

    fn source_name(&self) -> &str {
        "simulated-vision"
    }
}
