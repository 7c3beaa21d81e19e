//! Timestamp utilities
//!
//! Timestamps are f32 milliseconds, one entry per frame, monotonically
//! non-decreasing within a call. Callers either supply them explicitly or
//! the executor synthesizes them from a sample rate.

use crate::Sample;

/// Synthesize a uniform timestamp vector from a sample rate
///
/// `start_ms` is the timestamp of the first frame; spacing is
/// `1000 / sample_rate` milliseconds.
pub fn synthesize_timestamps(frames: usize, sample_rate: f32, start_ms: f32) -> Vec<f32> {
    let period = if sample_rate > 0.0 {
        1000.0 / sample_rate
    } else {
        0.0
    };
    (0..frames).map(|i| start_ms + i as f32 * period).collect()
}

/// Mean inter-frame delta of a timestamp vector (0 for fewer than 2 entries)
pub fn mean_delta(timestamps: &[f32]) -> f32 {
    if timestamps.len() < 2 {
        return 0.0;
    }
    let span = timestamps[timestamps.len() - 1] - timestamps[0];
    span / (timestamps.len() - 1) as f32
}

/// Regenerate a uniform timestamp vector after a resizing stage
///
/// The output keeps the input's first timestamp; spacing is the stage's
/// time-scale factor applied to the mean input delta. Near-uniform input is
/// assumed whenever a resizer is present.
pub fn rescale_timestamps(input: &[f32], output_frames: usize, time_scale: f64) -> Vec<f32> {
    let start = input.first().copied().unwrap_or(0.0);
    let delta = mean_delta(input) * time_scale as f32;
    (0..output_frames)
        .map(|i| start + i as f32 * delta)
        .collect()
}

/// Check a sample sequence for non-finite values
#[inline]
pub fn all_finite(samples: &[Sample]) -> bool {
    samples.iter().all(|s| s.is_finite())
}
