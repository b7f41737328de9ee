//! Range smoothing and staleness detection.
//!
//! A single stray reflection must not trigger a Danger alert, and a silent
//! sensor must not freeze its last distance forever. The filter keeps the
//! last `median_window` valid samples and reports their median; once no valid
//! echo has been seen for longer than `stale_timeout` it reports
//! `Unavailable` and forgets the buffered samples.

use statrs::statistics::{Data, Median};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::RangeConfig;
use crate::types::SensorReading;

/// Output of one filter step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilteredRange {
    /// Smoothed distance over the last `samples` valid echoes.
    Available {
        distance_cm: f64,
        samples: usize,
        /// Time of the newest valid echo in the window
        timestamp: Instant,
    },
    /// No valid echo yet since startup, still within the timeout.
    Pending,
    /// No valid echo for longer than the stale timeout.
    Unavailable {
        /// Time of the last valid echo, if there ever was one
        last_valid: Option<Instant>,
        consecutive_invalid: u32,
    },
}

impl FilteredRange {
    pub fn distance(&self) -> Option<f64> {
        match self {
            FilteredRange::Available { distance_cm, .. } => Some(*distance_cm),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, FilteredRange::Unavailable { .. })
    }
}

pub struct RangeFilter {
    window: VecDeque<f64>,
    window_size: usize,
    max_distance_cm: f64,
    stale_timeout: Duration,
    /// Filter creation; the staleness reference before the first echo
    started: Instant,
    last_valid: Option<Instant>,
    consecutive_invalid: u32,
    unavailable: bool,
}

impl RangeFilter {
    pub fn new(config: &RangeConfig, now: Instant) -> Self {
        let window_size = config.median_window.max(1);
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
            max_distance_cm: config.max_distance_cm,
            stale_timeout: config.stale_timeout(),
            started: now,
            last_valid: None,
            consecutive_invalid: 0,
            unavailable: false,
        }
    }

    /// Feed one raw reading and get the filtered view.
    pub fn push(&mut self, reading: SensorReading) -> FilteredRange {
        match reading.usable_distance() {
            Some(distance) => self.accept(distance.min(self.max_distance_cm), reading.timestamp),
            None => self.reject(reading.timestamp),
        }
    }

    /// Current view without a new reading (used when a read never returned).
    pub fn current(&self) -> FilteredRange {
        self.snapshot()
    }

    pub fn consecutive_invalid(&self) -> u32 {
        self.consecutive_invalid
    }

    fn accept(&mut self, distance: f64, timestamp: Instant) -> FilteredRange {
        if self.unavailable {
            info!(
                distance_cm = distance,
                missed = self.consecutive_invalid,
                "Range sensor recovered"
            );
            self.unavailable = false;
        }
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(distance);
        self.last_valid = Some(timestamp);
        self.consecutive_invalid = 0;
        self.snapshot()
    }

    fn reject(&mut self, timestamp: Instant) -> FilteredRange {
        self.consecutive_invalid = self.consecutive_invalid.saturating_add(1);

        let reference = self.last_valid.unwrap_or(self.started);
        let silent_for = timestamp.saturating_duration_since(reference);
        if !self.unavailable && silent_for > self.stale_timeout {
            info!(
                silent_ms = silent_for.as_millis() as u64,
                consecutive_invalid = self.consecutive_invalid,
                "Range sensor unavailable"
            );
            self.unavailable = true;
            self.window.clear();
        } else if !self.unavailable {
            debug!(consecutive_invalid = self.consecutive_invalid, "Invalid range reading");
        }
        self.snapshot()
    }

    fn snapshot(&self) -> FilteredRange {
        if self.unavailable {
            return FilteredRange::Unavailable {
                last_valid: self.last_valid,
                consecutive_invalid: self.consecutive_invalid,
            };
        }
        match self.last_valid {
            Some(timestamp) if !self.window.is_empty() => FilteredRange::Available {
                distance_cm: median(&self.window),
                samples: self.window.len(),
                timestamp,
            },
            _ => FilteredRange::Pending,
        }
    }
}

fn median(window: &VecDeque<f64>) -> f64 {
    Data::new(window.iter().copied().collect::<Vec<f64>>()).median()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_at(now: Instant) -> RangeFilter {
        RangeFilter::new(&RangeConfig::default(), now)
    }

    #[test]
    fn test_single_spike_is_suppressed() {
        let t0 = Instant::now();
        let mut f = filter_at(t0);
        let ms = Duration::from_millis;
        f.push(SensorReading::valid(120.0, t0));
        f.push(SensorReading::valid(118.0, t0 + ms(100)));
        let out = f.push(SensorReading::valid(20.0, t0 + ms(200)));
        assert_eq!(out.distance(), Some(118.0));
        let out = f.push(SensorReading::valid(121.0, t0 + ms(300)));
        assert_eq!(out.distance(), Some(119.0));
    }

    #[test]
    fn test_window_is_bounded() {
        let t0 = Instant::now();
        let mut f = filter_at(t0);
        for (i, d) in [10.0, 10.0, 10.0, 200.0, 200.0, 200.0, 200.0].iter().enumerate() {
            f.push(SensorReading::valid(*d, t0 + Duration::from_millis(i as u64 * 100)));
        }
        match f.current() {
            FilteredRange::Available { distance_cm, samples, .. } => {
                assert_eq!(samples, 5);
                assert_eq!(distance_cm, 200.0);
            }
            other => panic!("expected Available, got {other:?}"),
        }
    }

    #[test]
    fn test_far_echo_is_clamped() {
        let t0 = Instant::now();
        let mut f = filter_at(t0);
        assert_eq!(f.push(SensorReading::valid(950.0, t0)).distance(), Some(300.0));
    }

    #[test]
    fn test_invalid_reading_keeps_median_until_timeout() {
        let t0 = Instant::now();
        let mut f = filter_at(t0);
        f.push(SensorReading::valid(80.0, t0));
        let out = f.push(SensorReading::invalid(t0 + Duration::from_millis(500)));
        assert_eq!(out.distance(), Some(80.0));
        assert_eq!(f.consecutive_invalid(), 1);
    }

    #[test]
    fn test_pending_before_first_echo() {
        let t0 = Instant::now();
        let mut f = filter_at(t0);
        assert_eq!(f.current(), FilteredRange::Pending);
        assert_eq!(f.push(SensorReading::invalid(t0 + Duration::from_millis(300))), FilteredRange::Pending);
    }

    #[test]
    fn test_silence_past_timeout_is_unavailable_and_clears_buffer() {
        let t0 = Instant::now();
        let mut f = filter_at(t0);
        f.push(SensorReading::valid(40.0, t0));
        for i in 1..=12 {
            f.push(SensorReading::invalid(t0 + Duration::from_millis(i * 100)));
        }
        assert!(f.current().is_unavailable());

        // Recovery starts from fresh data, not the stale 40 cm
        let out = f.push(SensorReading::valid(150.0, t0 + Duration::from_millis(1_300)));
        assert_eq!(out.distance(), Some(150.0));
        if let FilteredRange::Available { samples, .. } = out {
            assert_eq!(samples, 1);
        }
    }

    #[test]
    fn test_exactly_at_timeout_is_still_available() {
        let t0 = Instant::now();
        let mut f = filter_at(t0);
        f.push(SensorReading::valid(90.0, t0));
        let out = f.push(SensorReading::invalid(t0 + Duration::from_millis(1_000)));
        assert_eq!(out.distance(), Some(90.0));
    }

    #[test]
    fn test_never_valid_becomes_unavailable() {
        let t0 = Instant::now();
        let mut f = filter_at(t0);
        let out = f.push(SensorReading::invalid(t0 + Duration::from_millis(1_200)));
        assert_eq!(
            out,
            FilteredRange::Unavailable { last_valid: None, consecutive_invalid: 1 }
        );
    }
}
