//! Timestamp drift detection
//!
//! Watches consecutive timestamp deltas against the expected period
//! `1000 / sample_rate` ms and reports samples whose relative deviation
//! exceeds a percent threshold. The previous timestamp is carried across
//! calls so drift spanning a block boundary is not missed.

use serde::{Deserialize, Serialize};

/// One detected drift occurrence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftEvent {
    pub previous_timestamp_ms: f32,
    pub current_timestamp_ms: f32,
    /// `|delta - expected|` in ms
    pub absolute_drift_ms: f32,
    /// `|delta - expected| / expected`
    pub relative_drift: f32,
    /// Index of the offending sample within the current call
    pub sample_index: usize,
}

/// Streaming drift detector
#[derive(Debug, Clone)]
pub struct DriftDetector {
    expected_period_ms: f32,
    /// Threshold as a fraction (0.05 = 5%)
    threshold: f32,
    previous: Option<f32>,
    events_total: u64,
}

impl DriftDetector {
    /// `threshold_percent` is in percent (5.0 = 5%)
    pub fn new(sample_rate: f32, threshold_percent: f32) -> Self {
        Self {
            expected_period_ms: 1000.0 / sample_rate.max(f32::MIN_POSITIVE),
            threshold: threshold_percent / 100.0,
            previous: None,
            events_total: 0,
        }
    }

    pub fn expected_period_ms(&self) -> f32 {
        self.expected_period_ms
    }

    /// Configured threshold as a fraction
    pub fn threshold_fraction(&self) -> f32 {
        self.threshold
    }

    pub fn events_total(&self) -> u64 {
        self.events_total
    }

    /// Scan one timestamp vector; invokes `on_drift` for each offender
    pub fn check(&mut self, timestamps: &[f32], mut on_drift: impl FnMut(&DriftEvent)) {
        for (index, &current) in timestamps.iter().enumerate() {
            if let Some(previous) = self.previous {
                let delta = current - previous;
                let absolute = (delta - self.expected_period_ms).abs();
                let relative = absolute / self.expected_period_ms;
                if relative > self.threshold {
                    self.events_total += 1;
                    on_drift(&DriftEvent {
                        previous_timestamp_ms: previous,
                        current_timestamp_ms: current,
                        absolute_drift_ms: absolute,
                        relative_drift: relative,
                        sample_index: index,
                    });
                }
            }
            self.previous = Some(current);
        }
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.events_total = 0;
    }
}
