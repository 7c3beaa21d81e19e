//! Sliding-window primitive
//!
//! Shared by every windowed statistic stage. Keeps a FIFO of
//! (timestamp, value) pairs plus O(1) running sums of powers 1 and 2 and the
//! absolute value. Two eviction policies:
//!
//! - sample-indexed: at most W entries
//! - time-indexed: entries whose timestamp lies within the trailing D ms of
//!   the newest entry
//!
//! Each sample costs exactly one add and however many evictions fall out,
//! so the running sums never desynchronize from the contents. On checkpoint
//! restore the sums are recomputed from the entries and cross-checked
//! against the serialized values.

use std::collections::VecDeque;

use serde_json::{json, Value};

use sf_core::{Sample, SfError, SfResult, RUNNING_SUM_TOLERANCE};

use crate::params::{samples_to_json, state_f64, state_f64_vec, state_sample_vec};

/// Window extent selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowSpec {
    /// Fixed number of samples
    Samples(usize),
    /// Trailing duration in milliseconds
    DurationMs(f32),
}

/// One channel's sliding window with running sums
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    spec: WindowSpec,
    entries: VecDeque<(f32, Sample)>,
    sum: f64,
    sum_sq: f64,
    sum_abs: f64,
}

impl SlidingWindow {
    pub fn new(spec: WindowSpec) -> Self {
        let capacity = match spec {
            WindowSpec::Samples(w) => w,
            WindowSpec::DurationMs(_) => 16,
        };
        Self {
            spec,
            entries: VecDeque::with_capacity(capacity),
            sum: 0.0,
            sum_sq: 0.0,
            sum_abs: 0.0,
        }
    }

    /// Push a sample, evicting per the window policy
    pub fn push(&mut self, timestamp: f32, value: Sample) {
        match self.spec {
            WindowSpec::Samples(w) => {
                if self.entries.len() == w {
                    self.evict_front();
                }
            }
            WindowSpec::DurationMs(duration) => {
                let cutoff = timestamp - duration;
                while matches!(self.entries.front(), Some(&(ts, _)) if ts < cutoff) {
                    self.evict_front();
                }
            }
        }
        let v = value as f64;
        self.sum += v;
        self.sum_sq += v * v;
        self.sum_abs += v.abs();
        self.entries.push_back((timestamp, value));
    }

    fn evict_front(&mut self) {
        if let Some((_, old)) = self.entries.pop_front() {
            let v = old as f64;
            self.sum -= v;
            self.sum_sq -= v * v;
            self.sum_abs -= v.abs();
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.sum / self.entries.len() as f64
        }
    }

    pub fn mean_square(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.sum_sq / self.entries.len() as f64
        }
    }

    pub fn rms(&self) -> f64 {
        self.mean_square().max(0.0).sqrt()
    }

    pub fn mean_abs(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.sum_abs / self.entries.len() as f64
        }
    }

    /// Unbiased variance; 0 for fewer than 2 entries
    pub fn variance(&self) -> f64 {
        let n = self.entries.len();
        if n < 2 {
            return 0.0;
        }
        let nf = n as f64;
        ((self.sum_sq - self.sum * self.sum / nf) / (nf - 1.0)).max(0.0)
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.sum = 0.0;
        self.sum_sq = 0.0;
        self.sum_abs = 0.0;
    }

    // ============ Checkpointing ============

    pub fn save_state(&self) -> Value {
        let timestamps: Vec<f64> = self.entries.iter().map(|&(ts, _)| ts as f64).collect();
        let values: Vec<Sample> = self.entries.iter().map(|&(_, v)| v).collect();
        json!({
            "timestamps": timestamps,
            "values": samples_to_json(&values),
            "sum": self.sum,
            "sumSquares": self.sum_sq,
            "sumAbs": self.sum_abs,
        })
    }

    /// Validate a window state document against this window's configuration
    pub fn validate_state(&self, state: &Value) -> SfResult<()> {
        let timestamps = state_f64_vec(state, "timestamps")?;
        let values = state_sample_vec(state, "values")?;
        if timestamps.len() != values.len() {
            return Err(SfError::state_mismatch(
                "values",
                "timestamp and value counts differ",
            ));
        }
        let declared_len = values.len();
        if let WindowSpec::Samples(w) = self.spec {
            if declared_len > w {
                return Err(SfError::state_mismatch(
                    "values",
                    format!("window holds {declared_len} entries but is configured for {w}"),
                ));
            }
        }

        // Declared running sums must agree with the contents
        let window_size = match self.spec {
            WindowSpec::Samples(w) => w as f64,
            WindowSpec::DurationMs(_) => declared_len.max(1) as f64,
        };
        let tolerance = RUNNING_SUM_TOLERANCE * window_size;
        let recomputed: f64 = values.iter().map(|&v| v as f64).sum();
        let declared = state_f64(state, "sum")?;
        if (recomputed - declared).abs() > tolerance {
            return Err(SfError::state_mismatch(
                "sum",
                format!("declared {declared} but contents sum to {recomputed}"),
            ));
        }
        let recomputed_sq: f64 = values.iter().map(|&v| (v as f64) * (v as f64)).sum();
        let declared_sq = state_f64(state, "sumSquares")?;
        if (recomputed_sq - declared_sq).abs() > tolerance {
            return Err(SfError::state_mismatch(
                "sumSquares",
                format!("declared {declared_sq} but contents sum to {recomputed_sq}"),
            ));
        }
        Ok(())
    }

    /// Apply a state document; running sums are recomputed from the contents
    pub fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        self.validate_state(state)?;
        let timestamps = state_f64_vec(state, "timestamps")?;
        let values = state_sample_vec(state, "values")?;
        self.reset();
        for (&ts, &v) in timestamps.iter().zip(&values) {
            // Re-push so sums rebuild exactly from contents
            let vf = v as f64;
            self.sum += vf;
            self.sum_sq += vf * vf;
            self.sum_abs += vf.abs();
            self.entries.push_back((ts as f32, v));
        }
        Ok(())
    }
}
