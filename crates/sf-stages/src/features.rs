//! Time-domain feature stages
//!
//! EMG-style features over a sliding window of W samples:
//! - waveform length: sum of |x[k] - x[k-1]| across the window
//! - slope-sign changes: direction reversals with amplitude above threshold
//! - Willison amplitude: step changes above threshold
//! - sliding linear regression: slope / intercept / residual / prediction
//!
//! All maintain O(1) per-sample updates over circular difference history and
//! emit the current window statistic at every sample.

use std::collections::VecDeque;

use serde_json::{json, Value};

use sf_core::{Sample, SfError, SfResult};

use crate::params::{opt_f64, req_str, req_usize, state_usize};
use crate::{Stage, StageDescriptor};

// ============ Difference Features (WL / SSC / WAMP) ============

/// Which difference statistic a `DiffFeatureStage` counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffFeatureKind {
    /// Sum of absolute first differences
    WaveformLength,
    /// Count of slope-sign changes above threshold
    SlopeSignChanges,
    /// Count of absolute differences above threshold (Willison amplitude)
    WillisonAmplitude,
}

impl DiffFeatureKind {
    pub fn type_name(self) -> &'static str {
        match self {
            Self::WaveformLength => "waveformLength",
            Self::SlopeSignChanges => "ssc",
            Self::WillisonAmplitude => "wamp",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct DiffChannel {
    prev: Option<Sample>,
    prev_diff: Option<f64>,
    /// WL: |diff| values; SSC/WAMP: 1.0 / 0.0 event flags
    history: VecDeque<f64>,
    running: f64,
}

impl DiffChannel {
    fn reset(&mut self) {
        self.prev = None;
        self.prev_diff = None;
        self.history.clear();
        self.running = 0.0;
    }
}

/// Shared implementation of the three difference features
pub struct DiffFeatureStage {
    kind: DiffFeatureKind,
    window_size: usize,
    threshold: f64,
    channels: Vec<DiffChannel>,
}

impl DiffFeatureStage {
    pub fn from_params(kind: DiffFeatureKind, params: &Value) -> SfResult<Self> {
        let window_size = req_usize(params, "windowSize")?;
        if window_size == 0 {
            return Err(SfError::invalid_param("windowSize", "must be positive"));
        }
        let threshold = match kind {
            DiffFeatureKind::WaveformLength => 0.0,
            _ => {
                let t = opt_f64(params, "threshold")?.unwrap_or(0.0);
                if t < 0.0 {
                    return Err(SfError::invalid_param("threshold", "must be >= 0"));
                }
                t
            }
        };
        Ok(Self {
            kind,
            window_size,
            threshold,
            channels: Vec::new(),
        })
    }

    /// A window of W samples holds W-1 first differences (W-2 sign pairs)
    fn history_capacity(&self) -> usize {
        match self.kind {
            DiffFeatureKind::SlopeSignChanges => self.window_size.saturating_sub(2).max(1),
            _ => self.window_size.saturating_sub(1).max(1),
        }
    }

    fn ensure_channels(&mut self, channels: usize) {
        if self.channels.len() != channels {
            self.channels = (0..channels).map(|_| DiffChannel::default()).collect();
        }
    }

    fn step(&mut self, channel: usize, value: Sample) -> Sample {
        let capacity = self.history_capacity();
        let threshold = self.threshold;
        let kind = self.kind;
        let state = &mut self.channels[channel];

        if let Some(prev) = state.prev {
            let diff = value as f64 - prev as f64;
            let contribution = match kind {
                DiffFeatureKind::WaveformLength => Some(diff.abs()),
                DiffFeatureKind::WillisonAmplitude => {
                    Some(if diff.abs() > threshold { 1.0 } else { 0.0 })
                }
                DiffFeatureKind::SlopeSignChanges => state.prev_diff.map(|prev_diff| {
                    let reversal = prev_diff * diff < 0.0;
                    let significant = prev_diff.abs().max(diff.abs()) > threshold;
                    if reversal && significant { 1.0 } else { 0.0 }
                }),
            };
            if let Some(c) = contribution {
                if state.history.len() == capacity {
                    if let Some(old) = state.history.pop_front() {
                        state.running -= old;
                    }
                }
                state.history.push_back(c);
                state.running += c;
            }
            state.prev_diff = Some(diff);
        }
        state.prev = Some(value);
        state.running as Sample
    }
}

impl Stage for DiffFeatureStage {
    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn descriptor(&self) -> StageDescriptor {
        let mut config = json!({ "windowSize": self.window_size });
        if self.kind != DiffFeatureKind::WaveformLength {
            config["threshold"] = json!(self.threshold);
        }
        StageDescriptor::new(self.type_name(), config)
    }

    fn process(
        &mut self,
        block: &mut [Sample],
        channels: usize,
        _timestamps: &[f32],
    ) -> SfResult<()> {
        self.ensure_channels(channels);
        let frames = block.len() / channels;
        for frame in 0..frames {
            for ch in 0..channels {
                let idx = frame * channels + ch;
                block[idx] = self.step(ch, block[idx]);
            }
        }
        Ok(())
    }

    fn save_state(&self) -> Value {
        let channels: Vec<Value> = self
            .channels
            .iter()
            .map(|c| {
                json!({
                    "prev": c.prev.map(|v| v as f64),
                    "prevDiff": c.prev_diff,
                    "history": c.history.iter().copied().collect::<Vec<f64>>(),
                    "running": c.running,
                })
            })
            .collect();
        json!({ "channels": channels.len(), "perChannel": channels })
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        let declared = state_usize(state, "channels")?;
        let per_channel = state
            .get("perChannel")
            .and_then(Value::as_array)
            .ok_or_else(|| SfError::state_mismatch("perChannel", "missing channel array"))?;
        if per_channel.len() != declared {
            return Err(SfError::state_mismatch("perChannel", "channel count mismatch"));
        }
        for entry in per_channel {
            let history = entry
                .get("history")
                .and_then(Value::as_array)
                .ok_or_else(|| SfError::state_mismatch("history", "missing"))?;
            if history.len() > self.history_capacity() {
                return Err(SfError::state_mismatch(
                    "history",
                    format!(
                        "holds {} entries but window {} allows {}",
                        history.len(),
                        self.window_size,
                        self.history_capacity()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        self.validate_state(state)?;
        let per_channel = state
            .get("perChannel")
            .and_then(Value::as_array)
            .ok_or_else(|| SfError::state_mismatch("perChannel", "missing channel array"))?;
        self.ensure_channels(per_channel.len());
        for (channel, entry) in self.channels.iter_mut().zip(per_channel) {
            channel.reset();
            channel.prev = entry.get("prev").and_then(Value::as_f64).map(|v| v as Sample);
            channel.prev_diff = entry.get("prevDiff").and_then(Value::as_f64);
            if let Some(history) = entry.get("history").and_then(Value::as_array) {
                for item in history {
                    let v = item
                        .as_f64()
                        .ok_or_else(|| SfError::state_mismatch("history", "non-numeric entry"))?;
                    channel.history.push_back(v);
                    channel.running += v;
                }
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
    }
}

// ============ Linear Regression ============

/// Which regression quantity to emit per sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegressionOutput {
    Slope,
    Intercept,
    Residuals,
    Predictions,
}

impl RegressionOutput {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "slope" => Some(Self::Slope),
            "intercept" => Some(Self::Intercept),
            "residuals" => Some(Self::Residuals),
            "predictions" => Some(Self::Predictions),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Slope => "slope",
            Self::Intercept => "intercept",
            Self::Residuals => "residuals",
            Self::Predictions => "predictions",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RegressionChannel {
    entries: VecDeque<(u64, Sample)>,
    sum_y: f64,
    /// Sum of absolute_index * y; relative forms derive by subtracting the base
    sum_iy: f64,
    next_index: u64,
}

impl RegressionChannel {
    fn reset(&mut self) {
        self.entries.clear();
        self.sum_y = 0.0;
        self.sum_iy = 0.0;
        self.next_index = 0;
    }
}

/// Sliding least-squares line over the trailing window
pub struct LinearRegressionStage {
    window_size: usize,
    output: RegressionOutput,
    channels: Vec<RegressionChannel>,
}

impl LinearRegressionStage {
    pub fn from_params(params: &Value) -> SfResult<Self> {
        let window_size = req_usize(params, "windowSize")?;
        if window_size == 0 {
            return Err(SfError::invalid_param("windowSize", "must be positive"));
        }
        let output = req_str(params, "output")?;
        let output = RegressionOutput::parse(output).ok_or_else(|| {
            SfError::invalid_param(
                "output",
                "expected slope|intercept|residuals|predictions",
            )
        })?;
        Ok(Self {
            window_size,
            output,
            channels: Vec::new(),
        })
    }

    fn ensure_channels(&mut self, channels: usize) {
        if self.channels.len() != channels {
            self.channels = (0..channels).map(|_| RegressionChannel::default()).collect();
        }
    }

    fn step(&mut self, channel: usize, value: Sample) -> Sample {
        let window_size = self.window_size;
        let output = self.output;
        let state = &mut self.channels[channel];

        if state.entries.len() == window_size {
            if let Some((idx, old)) = state.entries.pop_front() {
                state.sum_y -= old as f64;
                state.sum_iy -= idx as f64 * old as f64;
            }
        }
        let index = state.next_index;
        state.next_index += 1;
        state.entries.push_back((index, value));
        state.sum_y += value as f64;
        state.sum_iy += index as f64 * value as f64;

        let n = state.entries.len() as f64;
        let base = state.entries.front().map(|&(i, _)| i).unwrap_or(0) as f64;

        // Relative x runs 0..n-1 inside the window
        let sum_x = n * (n - 1.0) / 2.0;
        let sum_xx = (n - 1.0) * n * (2.0 * n - 1.0) / 6.0;
        let sum_xy = state.sum_iy - base * state.sum_y;
        let denom = n * sum_xx - sum_x * sum_x;

        let (slope, intercept) = if denom.abs() > f64::EPSILON {
            let slope = (n * sum_xy - sum_x * state.sum_y) / denom;
            let intercept = (state.sum_y - slope * sum_x) / n;
            (slope, intercept)
        } else {
            // Degenerate window (fewer than 2 points): flat line through the value
            (0.0, value as f64)
        };

        let prediction = intercept + slope * (n - 1.0);
        let result = match output {
            RegressionOutput::Slope => slope,
            RegressionOutput::Intercept => intercept,
            RegressionOutput::Predictions => prediction,
            RegressionOutput::Residuals => value as f64 - prediction,
        };
        result as Sample
    }
}

impl Stage for LinearRegressionStage {
    fn type_name(&self) -> &'static str {
        "linearRegression"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(
            self.type_name(),
            json!({ "windowSize": self.window_size, "output": self.output.as_str() }),
        )
    }

    fn process(
        &mut self,
        block: &mut [Sample],
        channels: usize,
        _timestamps: &[f32],
    ) -> SfResult<()> {
        self.ensure_channels(channels);
        let frames = block.len() / channels;
        for frame in 0..frames {
            for ch in 0..channels {
                let idx = frame * channels + ch;
                block[idx] = self.step(ch, block[idx]);
            }
        }
        Ok(())
    }

    fn save_state(&self) -> Value {
        let channels: Vec<Value> = self
            .channels
            .iter()
            .map(|c| {
                json!({
                    "indices": c.entries.iter().map(|&(i, _)| i).collect::<Vec<u64>>(),
                    "values": c.entries.iter().map(|&(_, v)| v as f64).collect::<Vec<f64>>(),
                    "nextIndex": c.next_index,
                })
            })
            .collect();
        json!({ "channels": channels.len(), "perChannel": channels })
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        let per_channel = state
            .get("perChannel")
            .and_then(Value::as_array)
            .ok_or_else(|| SfError::state_mismatch("perChannel", "missing channel array"))?;
        if per_channel.len() != state_usize(state, "channels")? {
            return Err(SfError::state_mismatch("perChannel", "channel count mismatch"));
        }
        for entry in per_channel {
            let values = entry
                .get("values")
                .and_then(Value::as_array)
                .ok_or_else(|| SfError::state_mismatch("values", "missing"))?;
            if values.len() > self.window_size {
                return Err(SfError::state_mismatch(
                    "values",
                    format!(
                        "window holds {} entries but is configured for {}",
                        values.len(),
                        self.window_size
                    ),
                ));
            }
        }
        Ok(())
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        self.validate_state(state)?;
        let per_channel = state
            .get("perChannel")
            .and_then(Value::as_array)
            .ok_or_else(|| SfError::state_mismatch("perChannel", "missing channel array"))?;
        self.ensure_channels(per_channel.len());
        for (channel, entry) in self.channels.iter_mut().zip(per_channel) {
            channel.reset();
            let indices = entry
                .get("indices")
                .and_then(Value::as_array)
                .ok_or_else(|| SfError::state_mismatch("indices", "missing"))?;
            let values = entry
                .get("values")
                .and_then(Value::as_array)
                .ok_or_else(|| SfError::state_mismatch("values", "missing"))?;
            if indices.len() != values.len() {
                return Err(SfError::state_mismatch("indices", "length mismatch with values"));
            }
            for (i, v) in indices.iter().zip(values) {
                let index = i
                    .as_u64()
                    .ok_or_else(|| SfError::state_mismatch("indices", "non-integer entry"))?;
                let value = v
                    .as_f64()
                    .ok_or_else(|| SfError::state_mismatch("values", "non-numeric entry"))?
                    as Sample;
                channel.entries.push_back((index, value));
                channel.sum_y += value as f64;
                channel.sum_iy += index as f64 * value as f64;
            }
            channel.next_index = entry
                .get("nextIndex")
                .and_then(Value::as_u64)
                .ok_or_else(|| SfError::state_mismatch("nextIndex", "missing"))?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
    }
}
