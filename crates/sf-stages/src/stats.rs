//! Windowed statistic stages
//!
//! Moving average, RMS, variance, MAV and Z-score all share the sliding
//! window primitive. `batch` mode computes one statistic over the whole
//! block per channel; `moving` mode emits the statistic of the trailing
//! window at every sample.

use serde_json::{json, Value};

use sf_core::{Sample, SfError, SfResult};

use crate::params::{opt_f64, opt_usize, req_str, state_usize};
use crate::window::{SlidingWindow, WindowSpec};
use crate::{Stage, StageDescriptor};

/// Default epsilon guarding the Z-score denominator
const ZSCORE_EPSILON: f64 = 1e-6;

/// Which statistic a `StatisticStage` emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticKind {
    Mean,
    Rms,
    Variance,
    MeanAbs,
    ZScore,
}

impl StatisticKind {
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Mean => "movingAverage",
            Self::Rms => "rms",
            Self::Variance => "variance",
            Self::MeanAbs => "mav",
            Self::ZScore => "zScore",
        }
    }
}

/// Batch vs per-sample windowing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatMode {
    Batch,
    Moving,
}

/// Shared implementation of the five windowed statistics
pub struct StatisticStage {
    kind: StatisticKind,
    mode: StatMode,
    spec: Option<WindowSpec>,
    epsilon: f64,
    windows: Vec<SlidingWindow>,
}

impl StatisticStage {
    pub fn from_params(kind: StatisticKind, params: &Value) -> SfResult<Self> {
        let mode = match req_str(params, "mode")? {
            "batch" => StatMode::Batch,
            "moving" => StatMode::Moving,
            other => {
                return Err(SfError::invalid_param(
                    "mode",
                    format!("expected `batch` or `moving`, got `{other}`"),
                ));
            }
        };

        let spec = if mode == StatMode::Moving {
            let window_size = opt_usize(params, "windowSize")?;
            let window_duration = opt_f64(params, "windowDuration")?;
            match (window_size, window_duration) {
                (Some(w), None) => {
                    if w == 0 {
                        return Err(SfError::invalid_param("windowSize", "must be positive"));
                    }
                    Some(WindowSpec::Samples(w))
                }
                (None, Some(d)) => {
                    if d <= 0.0 {
                        return Err(SfError::invalid_param("windowDuration", "must be positive"));
                    }
                    Some(WindowSpec::DurationMs(d as f32))
                }
                (None, None) => {
                    return Err(SfError::invalid_param(
                        "windowSize",
                        "moving mode needs windowSize or windowDuration",
                    ));
                }
                (Some(_), Some(_)) => {
                    return Err(SfError::invalid_param(
                        "windowSize",
                        "windowSize and windowDuration are mutually exclusive",
                    ));
                }
            }
        } else {
            None
        };

        let epsilon = opt_f64(params, "epsilon")?.unwrap_or(ZSCORE_EPSILON);
        if epsilon <= 0.0 {
            return Err(SfError::invalid_param("epsilon", "must be positive"));
        }

        Ok(Self {
            kind,
            mode,
            spec,
            epsilon,
            windows: Vec::new(),
        })
    }

    fn ensure_channels(&mut self, channels: usize) {
        if self.windows.len() != channels {
            let spec = self.spec.unwrap_or(WindowSpec::Samples(1));
            self.windows = (0..channels).map(|_| SlidingWindow::new(spec)).collect();
        }
    }

    fn emit(&self, window: &SlidingWindow, current: Sample) -> Sample {
        match self.kind {
            StatisticKind::Mean => window.mean() as Sample,
            StatisticKind::Rms => window.rms() as Sample,
            StatisticKind::Variance => window.variance() as Sample,
            StatisticKind::MeanAbs => window.mean_abs() as Sample,
            StatisticKind::ZScore => {
                let denom = (window.variance() + self.epsilon).sqrt();
                ((current as f64 - window.mean()) / denom) as Sample
            }
        }
    }

    fn process_batch(&self, block: &mut [Sample], channels: usize) {
        let frames = block.len() / channels;
        if frames == 0 {
            return;
        }
        for ch in 0..channels {
            let mut sum = 0.0f64;
            let mut sum_sq = 0.0f64;
            let mut sum_abs = 0.0f64;
            for frame in 0..frames {
                let v = block[frame * channels + ch] as f64;
                sum += v;
                sum_sq += v * v;
                sum_abs += v.abs();
            }
            let nf = frames as f64;
            let mean = sum / nf;
            let variance = if frames > 1 {
                ((sum_sq - sum * sum / nf) / (nf - 1.0)).max(0.0)
            } else {
                0.0
            };

            for frame in 0..frames {
                let slot = &mut block[frame * channels + ch];
                *slot = match self.kind {
                    StatisticKind::Mean => mean as Sample,
                    StatisticKind::Rms => (sum_sq / nf).sqrt() as Sample,
                    StatisticKind::Variance => variance as Sample,
                    StatisticKind::MeanAbs => (sum_abs / nf) as Sample,
                    StatisticKind::ZScore => {
                        ((*slot as f64 - mean) / (variance + self.epsilon).sqrt()) as Sample
                    }
                };
            }
        }
    }
}

impl Stage for StatisticStage {
    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn descriptor(&self) -> StageDescriptor {
        let mut config = json!({
            "mode": match self.mode {
                StatMode::Batch => "batch",
                StatMode::Moving => "moving",
            },
        });
        match self.spec {
            Some(WindowSpec::Samples(w)) => config["windowSize"] = json!(w),
            Some(WindowSpec::DurationMs(d)) => config["windowDuration"] = json!(d),
            None => {}
        }
        StageDescriptor::new(self.type_name(), config)
    }

    fn process(
        &mut self,
        block: &mut [Sample],
        channels: usize,
        timestamps: &[f32],
    ) -> SfResult<()> {
        match self.mode {
            StatMode::Batch => self.process_batch(block, channels),
            StatMode::Moving => {
                self.ensure_channels(channels);
                let frames = block.len() / channels;
                for frame in 0..frames {
                    let ts = timestamps.get(frame).copied().unwrap_or(frame as f32);
                    for ch in 0..channels {
                        let idx = frame * channels + ch;
                        let value = block[idx];
                        self.windows[ch].push(ts, value);
                        block[idx] = self.emit(&self.windows[ch], value);
                    }
                }
            }
        }
        Ok(())
    }

    fn save_state(&self) -> Value {
        match self.mode {
            StatMode::Batch => json!({}),
            StatMode::Moving => json!({
                "channels": self.windows.len(),
                "windows": self.windows.iter().map(|w| w.save_state()).collect::<Vec<_>>(),
            }),
        }
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        if self.mode == StatMode::Batch {
            return Ok(());
        }
        let channels = state_usize(state, "channels")?;
        let windows = state
            .get("windows")
            .and_then(Value::as_array)
            .ok_or_else(|| SfError::state_mismatch("windows", "missing window array"))?;
        if windows.len() != channels {
            return Err(SfError::state_mismatch(
                "windows",
                "window count disagrees with channel count",
            ));
        }
        let probe = SlidingWindow::new(self.spec.unwrap_or(WindowSpec::Samples(1)));
        for window_state in windows {
            probe.validate_state(window_state)?;
        }
        Ok(())
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        if self.mode == StatMode::Batch {
            return Ok(());
        }
        let channels = state_usize(state, "channels")?;
        self.ensure_channels(channels);
        let windows = state
            .get("windows")
            .and_then(Value::as_array)
            .ok_or_else(|| SfError::state_mismatch("windows", "missing window array"))?;
        for (window, window_state) in self.windows.iter_mut().zip(windows) {
            window.restore_state(window_state)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        for window in &mut self.windows {
            window.reset();
        }
    }
}
