//! Fixed-kernel convolution stage
//!
//! Causal FIR convolution against a caller-supplied kernel. Output length
//! always equals input length.
//!
//! - `moving` mode carries the trailing kernel-length-minus-one input
//!   samples across calls, so concatenated sub-blocks match one big block
//! - `batch` mode starts from silence every call
//!
//! Method `direct` runs in the time domain; `fft` runs overlap-save through
//! the shared FFT context; `auto` picks direct below the kernel-length
//! threshold and FFT at or above it.

use std::collections::HashMap;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use serde_json::{json, Value};

use sf_core::{Sample, SfError, SfResult};
use sf_dsp::FftContext;

use crate::params::{
    opt_str, opt_usize, req_sample_array, samples_to_json, state_usize,
};
use crate::{Stage, StageDescriptor};

/// Kernel length at which `auto` switches from direct to FFT
const DEFAULT_AUTO_THRESHOLD: usize = 64;

/// Statefulness across calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvMode {
    Moving,
    Batch,
}

/// Convolution algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvMethod {
    Auto,
    Direct,
    Fft,
}

/// FIR convolution stage
pub struct ConvolutionStage {
    kernel: Vec<f64>,
    mode: ConvMode,
    method: ConvMethod,
    auto_threshold: usize,
    fft: Arc<FftContext>,
    /// Per-channel trailing input history (kernel length - 1 samples)
    histories: Vec<Vec<Sample>>,
    /// Kernel spectra keyed by FFT size
    spectra: HashMap<usize, Vec<Complex<Sample>>>,
}

impl ConvolutionStage {
    pub fn from_params(params: &Value, fft: Arc<FftContext>) -> SfResult<Self> {
        let kernel = req_sample_array(params, "kernel")?;
        if kernel.is_empty() {
            return Err(SfError::invalid_param("kernel", "must be non-empty"));
        }
        let mode = match opt_str(params, "mode")?.unwrap_or("moving") {
            "moving" => ConvMode::Moving,
            "batch" => ConvMode::Batch,
            other => {
                return Err(SfError::invalid_param(
                    "mode",
                    format!("expected `moving` or `batch`, got `{other}`"),
                ));
            }
        };
        let method = match opt_str(params, "method")?.unwrap_or("auto") {
            "auto" => ConvMethod::Auto,
            "direct" => ConvMethod::Direct,
            "fft" => ConvMethod::Fft,
            other => {
                return Err(SfError::invalid_param(
                    "method",
                    format!("expected `auto`, `direct` or `fft`, got `{other}`"),
                ));
            }
        };
        let auto_threshold = opt_usize(params, "autoThreshold")?.unwrap_or(DEFAULT_AUTO_THRESHOLD);

        Ok(Self {
            kernel: kernel.iter().map(|&k| k as f64).collect(),
            mode,
            method,
            auto_threshold,
            fft,
            histories: Vec::new(),
            spectra: HashMap::new(),
        })
    }

    fn use_fft(&self) -> bool {
        match self.method {
            ConvMethod::Direct => false,
            ConvMethod::Fft => true,
            ConvMethod::Auto => self.kernel.len() >= self.auto_threshold,
        }
    }

    fn ensure_channels(&mut self, channels: usize) {
        if self.histories.len() != channels {
            let tail = self.kernel.len() - 1;
            self.histories = (0..channels).map(|_| vec![0.0; tail]).collect();
        }
    }

    /// Direct time-domain convolution over history + input
    fn convolve_direct(&self, extended: &[Sample], output: &mut [Sample]) {
        let m = self.kernel.len();
        for (i, slot) in output.iter_mut().enumerate() {
            // extended[i + m - 1] is the current sample
            let mut acc = 0.0f64;
            for (k, &h) in self.kernel.iter().enumerate() {
                acc += h * extended[i + m - 1 - k] as f64;
            }
            *slot = acc as Sample;
        }
    }

    fn kernel_spectrum(&mut self, fft_size: usize) -> SfResult<Vec<Complex<Sample>>> {
        if let Some(spectrum) = self.spectra.get(&fft_size) {
            return Ok(spectrum.clone());
        }
        let mut padded = vec![0.0 as Sample; fft_size];
        for (slot, &h) in padded.iter_mut().zip(&self.kernel) {
            *slot = h as Sample;
        }
        let spectrum = self.fft.rfft(&padded)?;
        self.spectra.insert(fft_size, spectrum.clone());
        Ok(spectrum)
    }

    /// Overlap-save convolution over history + input
    fn convolve_fft(&mut self, extended: &[Sample], output: &mut [Sample]) -> SfResult<()> {
        let m = self.kernel.len();
        let n = output.len();
        let fft_size = m.max(n).next_power_of_two().max(2);
        let step = fft_size - m + 1;
        let spectrum = self.kernel_spectrum(fft_size)?;

        let mut pos = 0;
        while pos < n {
            // Segment covers extended[pos .. pos + fft_size], zero-padded
            let mut segment = vec![0.0 as Sample; fft_size];
            let available = (extended.len() - pos).min(fft_size);
            segment[..available].copy_from_slice(&extended[pos..pos + available]);

            let seg_spectrum = self.fft.rfft(&segment)?;
            let product: Vec<Complex<Sample>> = seg_spectrum
                .iter()
                .zip(&spectrum)
                .map(|(a, b)| a * b)
                .collect();
            let time = self.fft.irfft(&product, fft_size)?;

            // Discard the first m-1 wrapped samples
            let take = step.min(n - pos);
            output[pos..pos + take].copy_from_slice(&time[m - 1..m - 1 + take]);
            pos += step;
        }
        Ok(())
    }
}

impl Stage for ConvolutionStage {
    fn type_name(&self) -> &'static str {
        "convolution"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(
            self.type_name(),
            json!({
                "kernelLength": self.kernel.len(),
                "mode": match self.mode {
                    ConvMode::Moving => "moving",
                    ConvMode::Batch => "batch",
                },
            }),
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
        let tail = self.kernel.len() - 1;
        let use_fft = self.use_fft();

        for ch in 0..channels {
            let input = sf_core::extract_channel(block, channels, ch);
            let mut extended = Vec::with_capacity(tail + frames);
            if self.mode == ConvMode::Moving {
                extended.extend_from_slice(&self.histories[ch]);
            } else {
                extended.resize(tail, 0.0);
            }
            extended.extend_from_slice(&input);

            let mut output = vec![0.0 as Sample; frames];
            if use_fft {
                self.convolve_fft(&extended, &mut output)?;
            } else {
                self.convolve_direct(&extended, &mut output);
            }

            if self.mode == ConvMode::Moving && tail > 0 {
                let start = extended.len() - tail;
                self.histories[ch].copy_from_slice(&extended[start..]);
            }
            sf_core::scatter_channel(block, channels, ch, &output);
        }
        Ok(())
    }

    fn save_state(&self) -> Value {
        if self.mode == ConvMode::Batch {
            return json!({});
        }
        json!({
            "kernelLength": self.kernel.len(),
            "channels": self.histories.len(),
            "histories": self.histories.iter().map(|h| samples_to_json(h)).collect::<Vec<_>>(),
        })
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        if self.mode == ConvMode::Batch {
            return Ok(());
        }
        let kernel_length = state_usize(state, "kernelLength")?;
        if kernel_length != self.kernel.len() {
            return Err(SfError::state_mismatch(
                "kernelLength",
                format!("checkpoint has {kernel_length}, stage has {}", self.kernel.len()),
            ));
        }
        let histories = state
            .get("histories")
            .and_then(Value::as_array)
            .ok_or_else(|| SfError::state_mismatch("histories", "missing"))?;
        for history in histories {
            let len = history.as_array().map(|a| a.len()).unwrap_or(usize::MAX);
            if len != self.kernel.len() - 1 {
                return Err(SfError::state_mismatch(
                    "histories",
                    "history length must be kernel length - 1",
                ));
            }
        }
        Ok(())
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        if self.mode == ConvMode::Batch {
            return Ok(());
        }
        self.validate_state(state)?;
        let histories = state
            .get("histories")
            .and_then(Value::as_array)
            .ok_or_else(|| SfError::state_mismatch("histories", "missing"))?;
        self.histories = histories
            .iter()
            .map(|h| {
                h.as_array()
                    .map(|a| {
                        a.iter()
                            .map(|v| v.as_f64().unwrap_or(0.0) as Sample)
                            .collect()
                    })
                    .ok_or_else(|| SfError::state_mismatch("histories", "non-array entry"))
            })
            .collect::<SfResult<_>>()?;
        Ok(())
    }

    fn reset(&mut self) {
        for history in &mut self.histories {
            history.fill(0.0);
        }
    }
}
