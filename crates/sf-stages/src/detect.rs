//! Detection stages
//!
//! - `clipDetection`: 1.0 where |x| >= threshold, stateless
//! - `peakDetection`: local-maximum marker with threshold and optional
//!   minimum peak distance; the marker for frame k-1 is emitted once frame k
//!   confirms it, so the output carries one frame of latency and block
//!   boundaries are seamless
//! - `snr`: dual-window RMS ratio of channel 0 over channel 1 in dB,
//!   clamped to +/-100, emitted on channel 0

use serde_json::{json, Value};

use sf_core::{Sample, SfError, SfResult};

use crate::params::{opt_f64, opt_usize, req_usize, state_usize};
use crate::window::{SlidingWindow, WindowSpec};
use crate::{Stage, StageDescriptor};

// ============ Clip Detection ============

/// Threshold clip marker
pub struct ClipDetectionStage {
    threshold: f64,
}

impl ClipDetectionStage {
    pub fn from_params(params: &Value) -> SfResult<Self> {
        let threshold = opt_f64(params, "threshold")?.unwrap_or(1.0);
        if threshold <= 0.0 {
            return Err(SfError::invalid_param("threshold", "must be positive"));
        }
        Ok(Self { threshold })
    }
}

impl Stage for ClipDetectionStage {
    fn type_name(&self) -> &'static str {
        "clipDetection"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(self.type_name(), json!({ "threshold": self.threshold }))
    }

    fn process(
        &mut self,
        block: &mut [Sample],
        _channels: usize,
        _timestamps: &[f32],
    ) -> SfResult<()> {
        let threshold = self.threshold as Sample;
        for sample in block.iter_mut() {
            *sample = if sample.abs() >= threshold { 1.0 } else { 0.0 };
        }
        Ok(())
    }

    fn save_state(&self) -> Value {
        json!({})
    }

    fn validate_state(&self, _state: &Value) -> SfResult<()> {
        Ok(())
    }

    fn restore_state(&mut self, _state: &Value) -> SfResult<()> {
        Ok(())
    }

    fn reset(&mut self) {}
}

// ============ Peak Detection ============

#[derive(Debug, Clone, Default)]
struct PeakChannel {
    prev1: Option<f64>,
    prev2: Option<f64>,
    /// Frames since the last accepted peak
    since_peak: Option<u64>,
}

/// Streaming local-maximum detector
pub struct PeakDetectionStage {
    threshold: f64,
    min_distance: usize,
    channels: Vec<PeakChannel>,
}

impl PeakDetectionStage {
    pub fn from_params(params: &Value) -> SfResult<Self> {
        let threshold = opt_f64(params, "threshold")?.unwrap_or(0.0);
        let min_distance = opt_usize(params, "minDistance")?.unwrap_or(0);
        Ok(Self {
            threshold,
            min_distance,
            channels: Vec::new(),
        })
    }

    fn ensure_channels(&mut self, channels: usize) {
        if self.channels.len() != channels {
            self.channels = (0..channels).map(|_| PeakChannel::default()).collect();
        }
    }

    /// Emits the marker for the previous frame, using `value` as the right
    /// neighbor
    fn step(&mut self, channel: usize, value: Sample) -> Sample {
        let threshold = self.threshold;
        let min_distance = self.min_distance as u64;
        let state = &mut self.channels[channel];
        let x = value as f64;

        let mut marker = 0.0;
        if let (Some(p1), Some(p2)) = (state.prev1, state.prev2) {
            let is_local_max = p1 > p2 && p1 > x && p1 > threshold;
            let far_enough = match state.since_peak {
                Some(since) => since >= min_distance,
                None => true,
            };
            if is_local_max && far_enough {
                marker = 1.0;
                state.since_peak = Some(0);
            }
        }
        if let Some(since) = state.since_peak.as_mut() {
            *since += 1;
        }
        state.prev2 = state.prev1;
        state.prev1 = Some(x);
        marker as Sample
    }
}

impl Stage for PeakDetectionStage {
    fn type_name(&self) -> &'static str {
        "peakDetection"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(
            self.type_name(),
            json!({ "threshold": self.threshold, "minDistance": self.min_distance }),
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
                    "prev1": c.prev1,
                    "prev2": c.prev2,
                    "sincePeak": c.since_peak,
                })
            })
            .collect();
        json!({ "channels": channels.len(), "perChannel": channels })
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        state_usize(state, "channels").map(|_| ())
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        let per_channel = state
            .get("perChannel")
            .and_then(Value::as_array)
            .ok_or_else(|| SfError::state_mismatch("perChannel", "missing channel array"))?;
        self.ensure_channels(per_channel.len());
        for (channel, entry) in self.channels.iter_mut().zip(per_channel) {
            channel.prev1 = entry.get("prev1").and_then(Value::as_f64);
            channel.prev2 = entry.get("prev2").and_then(Value::as_f64);
            channel.since_peak = entry.get("sincePeak").and_then(Value::as_u64);
        }
        Ok(())
    }

    fn reset(&mut self) {
        for channel in &mut self.channels {
            *channel = PeakChannel::default();
        }
    }
}

// ============ SNR ============

/// Dual-window signal-to-noise ratio in dB
pub struct SnrStage {
    window_size: usize,
    signal: SlidingWindow,
    noise: SlidingWindow,
}

impl SnrStage {
    pub fn from_params(params: &Value) -> SfResult<Self> {
        let window_size = req_usize(params, "windowSize")?;
        if window_size == 0 {
            return Err(SfError::invalid_param("windowSize", "must be positive"));
        }
        Ok(Self {
            window_size,
            signal: SlidingWindow::new(WindowSpec::Samples(window_size)),
            noise: SlidingWindow::new(WindowSpec::Samples(window_size)),
        })
    }

    fn snr_db(&self) -> f64 {
        let signal_power = self.signal.mean_square();
        let noise_power = self.noise.mean_square();
        if noise_power < 1e-20 {
            return if signal_power < 1e-20 { 0.0 } else { 100.0 };
        }
        (10.0 * (signal_power / noise_power).log10()).clamp(-100.0, 100.0)
    }
}

impl Stage for SnrStage {
    fn type_name(&self) -> &'static str {
        "snr"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(self.type_name(), json!({ "windowSize": self.window_size }))
    }

    fn required_channels(&self) -> Option<usize> {
        Some(2)
    }

    fn is_resizing(&self) -> bool {
        true
    }

    fn output_channels(&self, _input_channels: usize) -> usize {
        1
    }

    fn process_resizing(
        &mut self,
        input: &[Sample],
        channels: usize,
        timestamps: &[f32],
        output: &mut Vec<Sample>,
    ) -> SfResult<usize> {
        if channels != 2 {
            return Err(SfError::ChannelMismatch {
                expected: 2,
                got: channels,
            });
        }
        let frames = input.len() / 2;
        output.reserve(frames);
        for (frame_idx, frame) in input.chunks_exact(2).enumerate() {
            let ts = timestamps.get(frame_idx).copied().unwrap_or(frame_idx as f32);
            self.signal.push(ts, frame[0]);
            self.noise.push(ts, frame[1]);
            output.push(self.snr_db() as Sample);
        }
        Ok(frames)
    }

    fn save_state(&self) -> Value {
        json!({
            "windowSize": self.window_size,
            "signal": self.signal.save_state(),
            "noise": self.noise.save_state(),
        })
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        if state_usize(state, "windowSize")? != self.window_size {
            return Err(SfError::state_mismatch("windowSize", "window size mismatch"));
        }
        let signal = state
            .get("signal")
            .ok_or_else(|| SfError::state_mismatch("signal", "missing"))?;
        self.signal.validate_state(signal)?;
        let noise = state
            .get("noise")
            .ok_or_else(|| SfError::state_mismatch("noise", "missing"))?;
        self.noise.validate_state(noise)
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        self.validate_state(state)?;
        self.signal.restore_state(
            state
                .get("signal")
                .ok_or_else(|| SfError::state_mismatch("signal", "missing"))?,
        )?;
        self.noise.restore_state(
            state
                .get("noise")
                .ok_or_else(|| SfError::state_mismatch("noise", "missing"))?,
        )
    }

    fn reset(&mut self) {
        self.signal.reset();
        self.noise.reset();
    }
}
