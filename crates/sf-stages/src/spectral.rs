//! Spectral stages
//!
//! - `fft`: one transform over the block (batch, resizing). Types `fft` and
//!   `rfft` are radix-2 and enforce power-of-2 sizes at construction; `dft`
//!   and `rdft` accept arbitrary sizes through the mixed-radix planner.
//! - `stft`: streaming short-time transform with per-channel overlap
//!   buffering; emits `floor((buffered + n - windowSize) / hopSize) + 1`
//!   frames per call once a full window is available.
//! - `hilbertEnvelope`: per-window analytic-signal magnitude.
//!
//! All three read plans from the shared [`FftContext`].

use std::sync::Arc;

use rustfft::num_complex::Complex;
use serde_json::{json, Value};

use sf_core::{Sample, SfError, SfResult};
use sf_dsp::fft::{render_spectrum, SpectrumFormat};
use sf_dsp::{FftContext, WindowKind};

use crate::params::{opt_bool, opt_str, opt_usize, req_usize, samples_to_json, state_usize};
use crate::{Stage, StageDescriptor};

fn parse_format(name: &str) -> SfResult<SpectrumFormat> {
    match name {
        "complex" => Ok(SpectrumFormat::Complex),
        "magnitude" => Ok(SpectrumFormat::Magnitude),
        "power" => Ok(SpectrumFormat::Power),
        "phase" => Ok(SpectrumFormat::Phase),
        other => Err(SfError::invalid_param(
            "output",
            format!("expected complex|magnitude|power|phase, got `{other}`"),
        )),
    }
}

fn format_name(format: SpectrumFormat) -> &'static str {
    match format {
        SpectrumFormat::Complex => "complex",
        SpectrumFormat::Magnitude => "magnitude",
        SpectrumFormat::Power => "power",
        SpectrumFormat::Phase => "phase",
    }
}

// ============ FFT Stage ============

/// Transform flavor for the batch FFT stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftKind {
    /// Complex radix-2 (power-of-2 sizes)
    Fft,
    /// Complex arbitrary-size
    Dft,
    /// Real radix-2, half spectrum
    Rfft,
    /// Real arbitrary-size, half spectrum
    Rdft,
}

impl FftKind {
    fn parse(name: &str) -> SfResult<Self> {
        match name {
            "fft" => Ok(Self::Fft),
            "dft" => Ok(Self::Dft),
            "rfft" => Ok(Self::Rfft),
            "rdft" => Ok(Self::Rdft),
            other => Err(SfError::invalid_param(
                "type",
                format!("expected fft|dft|rfft|rdft, got `{other}`"),
            )),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Fft => "fft",
            Self::Dft => "dft",
            Self::Rfft => "rfft",
            Self::Rdft => "rdft",
        }
    }

    fn is_real(self) -> bool {
        matches!(self, Self::Rfft | Self::Rdft)
    }

    fn needs_pow2(self) -> bool {
        matches!(self, Self::Fft | Self::Rfft)
    }
}

/// Batch spectrum stage
///
/// Consumes `size` samples per channel (zero-padded or truncated) and emits
/// the rendered spectrum. Inverse mode expects interleaved re/im input and
/// emits the complex time series; it is only defined for the complex types.
pub struct FftStage {
    size: usize,
    kind: FftKind,
    forward: bool,
    format: SpectrumFormat,
    fft: Arc<FftContext>,
}

impl FftStage {
    pub fn from_params(params: &Value, fft: Arc<FftContext>) -> SfResult<Self> {
        let size = req_usize(params, "size")?;
        if size == 0 {
            return Err(SfError::invalid_param("size", "must be positive"));
        }
        let kind = FftKind::parse(opt_str(params, "type")?.unwrap_or("rfft"))?;
        if kind.needs_pow2() && !size.is_power_of_two() {
            return Err(SfError::invalid_param(
                "size",
                format!("{} requires a power-of-2 size, got {size}", kind.as_str()),
            ));
        }
        let forward = opt_bool(params, "forward", true)?;
        let format = parse_format(opt_str(params, "output")?.unwrap_or("magnitude"))?;
        if !forward && (kind.is_real() || format != SpectrumFormat::Complex) {
            return Err(SfError::invalid_param(
                "forward",
                "inverse transforms need a complex type and complex output",
            ));
        }
        Ok(Self {
            size,
            kind,
            forward,
            format,
            fft,
        })
    }

    /// Output samples per channel
    fn out_len(&self) -> usize {
        if !self.forward {
            return self.size * 2;
        }
        let bins = if self.kind.is_real() {
            self.size / 2 + 1
        } else {
            self.size
        };
        match self.format {
            SpectrumFormat::Complex => bins * 2,
            _ => bins,
        }
    }

    fn transform_channel(&self, input: &[Sample], out: &mut Vec<Sample>) -> SfResult<()> {
        if !self.forward {
            // Interleaved re/im input, `size` bins
            let mut data: Vec<Complex<Sample>> = (0..self.size)
                .map(|i| {
                    let re = input.get(i * 2).copied().unwrap_or(0.0);
                    let im = input.get(i * 2 + 1).copied().unwrap_or(0.0);
                    Complex::new(re, im)
                })
                .collect();
            self.fft.fft_complex(&mut data, false)?;
            for c in &data {
                out.push(c.re);
                out.push(c.im);
            }
            return Ok(());
        }

        // Forward: pad or truncate the channel to `size` real samples
        let mut padded = vec![0.0 as Sample; self.size];
        let take = input.len().min(self.size);
        padded[..take].copy_from_slice(&input[..take]);

        if self.kind.is_real() {
            let bins = self.fft.rfft(&padded)?;
            let mut rendered = Vec::new();
            render_spectrum(&bins, self.format, &mut rendered);
            out.extend_from_slice(&rendered);
        } else {
            let mut data: Vec<Complex<Sample>> =
                padded.iter().map(|&x| Complex::new(x, 0.0)).collect();
            self.fft.fft_complex(&mut data, true)?;
            let mut rendered = Vec::new();
            render_spectrum(&data, self.format, &mut rendered);
            out.extend_from_slice(&rendered);
        }
        Ok(())
    }
}

impl Stage for FftStage {
    fn type_name(&self) -> &'static str {
        "fft"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(
            self.type_name(),
            json!({
                "size": self.size,
                "type": self.kind.as_str(),
                "forward": self.forward,
                "output": format_name(self.format),
            }),
        )
    }

    fn is_resizing(&self) -> bool {
        true
    }

    fn output_frames(&self, _input_frames: usize) -> usize {
        self.out_len()
    }

    fn process_resizing(
        &mut self,
        input: &[Sample],
        channels: usize,
        _timestamps: &[f32],
        output: &mut Vec<Sample>,
    ) -> SfResult<usize> {
        let mut per_channel: Vec<Vec<Sample>> = Vec::with_capacity(channels);
        for ch in 0..channels {
            let channel_input = sf_core::extract_channel(input, channels, ch);
            let mut out = Vec::with_capacity(self.out_len());
            self.transform_channel(&channel_input, &mut out)?;
            per_channel.push(out);
        }
        let frames = self.out_len();
        output.reserve(frames * channels);
        for frame in 0..frames {
            for channel_out in &per_channel {
                output.push(channel_out[frame]);
            }
        }
        Ok(frames)
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

// ============ STFT Stage ============

/// Streaming short-time Fourier transform
pub struct StftStage {
    window_size: usize,
    hop_size: usize,
    window: WindowKind,
    format: SpectrumFormat,
    forward: bool,
    coefficients: Vec<Sample>,
    fft: Arc<FftContext>,
    /// Forward: pending input; inverse: overlap-add tail
    buffers: Vec<Vec<Sample>>,
}

impl StftStage {
    pub fn from_params(params: &Value, fft: Arc<FftContext>) -> SfResult<Self> {
        let window_size = req_usize(params, "windowSize")?;
        if window_size == 0 {
            return Err(SfError::invalid_param("windowSize", "must be positive"));
        }
        let method = opt_str(params, "method")?.unwrap_or("auto");
        match method {
            "fft" => {
                if !window_size.is_power_of_two() {
                    return Err(SfError::invalid_param(
                        "windowSize",
                        "method `fft` requires a power-of-2 window",
                    ));
                }
            }
            "auto" | "dft" => {}
            other => {
                return Err(SfError::invalid_param(
                    "method",
                    format!("expected auto|fft|dft, got `{other}`"),
                ));
            }
        }
        let hop_size = opt_usize(params, "hopSize")?.unwrap_or(window_size / 2).max(1);
        if hop_size > window_size {
            return Err(SfError::invalid_param(
                "hopSize",
                "must be in (0, windowSize]",
            ));
        }
        let window = match opt_str(params, "window")? {
            None => WindowKind::Hann,
            Some(name) => WindowKind::parse(name)
                .ok_or_else(|| SfError::invalid_param("window", "unknown window function"))?,
        };
        let format = parse_format(opt_str(params, "output")?.unwrap_or("magnitude"))?;
        let forward = opt_bool(params, "forward", true)?;
        if !forward && format != SpectrumFormat::Complex {
            return Err(SfError::invalid_param(
                "forward",
                "inverse STFT consumes complex frames",
            ));
        }
        Ok(Self {
            window_size,
            hop_size,
            window,
            format,
            forward,
            coefficients: window.periodic(window_size),
            fft,
            buffers: Vec::new(),
        })
    }

    fn bins(&self) -> usize {
        self.window_size / 2 + 1
    }

    /// Output samples per channel per emitted frame
    fn frame_len(&self) -> usize {
        match self.format {
            SpectrumFormat::Complex => self.bins() * 2,
            _ => self.bins(),
        }
    }

    fn ensure_channels(&mut self, channels: usize) {
        if self.buffers.len() != channels {
            self.buffers = (0..channels).map(|_| Vec::new()).collect();
        }
    }

    fn forward_channel(&mut self, channel: usize, input: &[Sample]) -> SfResult<Vec<Sample>> {
        let ws = self.window_size;
        let hop = self.hop_size;

        let mut buffer = std::mem::take(&mut self.buffers[channel]);
        buffer.extend_from_slice(input);

        let mut out = Vec::new();
        let mut rendered = Vec::new();
        while buffer.len() >= ws {
            let windowed: Vec<Sample> = buffer[..ws]
                .iter()
                .zip(&self.coefficients)
                .map(|(x, w)| x * w)
                .collect();
            let bins = self.fft.rfft(&windowed)?;
            render_spectrum(&bins, self.format, &mut rendered);
            out.extend_from_slice(&rendered);
            buffer.drain(..hop);
        }
        self.buffers[channel] = buffer;
        Ok(out)
    }

    fn inverse_channel(&mut self, channel: usize, input: &[Sample]) -> SfResult<Vec<Sample>> {
        let ws = self.window_size;
        let hop = self.hop_size;
        let frame_len = self.bins() * 2;

        let ola = &mut self.buffers[channel];
        if ola.len() != ws {
            ola.resize(ws, 0.0);
        }

        let mut out = Vec::new();
        for frame in input.chunks_exact(frame_len) {
            let spectrum: Vec<Complex<Sample>> = frame
                .chunks_exact(2)
                .map(|p| Complex::new(p[0], p[1]))
                .collect();
            let time = self.fft.irfft(&spectrum, ws)?;
            for (slot, &x) in ola.iter_mut().zip(&time) {
                *slot += x;
            }
            out.extend_from_slice(&ola[..hop]);
            ola.drain(..hop);
            ola.resize(ws, 0.0);
        }
        Ok(out)
    }
}

impl Stage for StftStage {
    fn type_name(&self) -> &'static str {
        "stft"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(
            self.type_name(),
            json!({
                "windowSize": self.window_size,
                "hopSize": self.hop_size,
                "window": self.window.as_str(),
                "output": format_name(self.format),
                "forward": self.forward,
            }),
        )
    }

    fn is_resizing(&self) -> bool {
        true
    }

    fn time_scale(&self) -> f64 {
        if self.forward {
            self.hop_size as f64 / self.frame_len() as f64
        } else {
            (self.bins() * 2) as f64 / self.hop_size as f64
        }
    }

    fn output_frames(&self, input_frames: usize) -> usize {
        if self.forward {
            let buffered = self.buffers.first().map(Vec::len).unwrap_or(0);
            let total = buffered + input_frames;
            if total < self.window_size {
                0
            } else {
                ((total - self.window_size) / self.hop_size + 1) * self.frame_len()
            }
        } else {
            input_frames / (self.bins() * 2) * self.hop_size
        }
    }

    fn process_resizing(
        &mut self,
        input: &[Sample],
        channels: usize,
        _timestamps: &[f32],
        output: &mut Vec<Sample>,
    ) -> SfResult<usize> {
        self.ensure_channels(channels);
        let mut per_channel: Vec<Vec<Sample>> = Vec::with_capacity(channels);
        for ch in 0..channels {
            let channel_input = sf_core::extract_channel(input, channels, ch);
            let out = if self.forward {
                self.forward_channel(ch, &channel_input)?
            } else {
                self.inverse_channel(ch, &channel_input)?
            };
            per_channel.push(out);
        }
        let frames = per_channel.first().map(Vec::len).unwrap_or(0);
        output.reserve(frames * channels);
        for frame in 0..frames {
            for channel_out in &per_channel {
                output.push(channel_out[frame]);
            }
        }
        Ok(frames)
    }

    fn save_state(&self) -> Value {
        json!({
            "windowSize": self.window_size,
            "hopSize": self.hop_size,
            "channels": self.buffers.len(),
            "buffers": self.buffers.iter().map(|b| samples_to_json(b)).collect::<Vec<_>>(),
        })
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        if state_usize(state, "windowSize")? != self.window_size {
            return Err(SfError::state_mismatch("windowSize", "window size mismatch"));
        }
        if state_usize(state, "hopSize")? != self.hop_size {
            return Err(SfError::state_mismatch("hopSize", "hop size mismatch"));
        }
        Ok(())
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        self.validate_state(state)?;
        let buffers = state
            .get("buffers")
            .and_then(Value::as_array)
            .ok_or_else(|| SfError::state_mismatch("buffers", "missing"))?;
        self.buffers = buffers
            .iter()
            .map(|b| {
                b.as_array()
                    .map(|a| {
                        a.iter()
                            .map(|v| v.as_f64().unwrap_or(0.0) as Sample)
                            .collect()
                    })
                    .ok_or_else(|| SfError::state_mismatch("buffers", "non-array entry"))
            })
            .collect::<SfResult<_>>()?;
        Ok(())
    }

    fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
    }
}

// ============ Hilbert Envelope ============

/// Analytic-signal envelope over hopped windows
///
/// Each full window yields `windowSize` envelope samples: FFT, zero the
/// negative frequencies, double the positive ones, inverse FFT, magnitude.
pub struct HilbertEnvelopeStage {
    window_size: usize,
    hop_size: usize,
    fft: Arc<FftContext>,
    buffers: Vec<Vec<Sample>>,
}

impl HilbertEnvelopeStage {
    pub fn from_params(params: &Value, fft: Arc<FftContext>) -> SfResult<Self> {
        let window_size = req_usize(params, "windowSize")?;
        if window_size == 0 {
            return Err(SfError::invalid_param("windowSize", "must be positive"));
        }
        let hop_size = opt_usize(params, "hopSize")?.unwrap_or(window_size / 2).max(1);
        if hop_size > window_size {
            return Err(SfError::invalid_param(
                "hopSize",
                "must be in (0, windowSize]",
            ));
        }
        Ok(Self {
            window_size,
            hop_size,
            fft,
            buffers: Vec::new(),
        })
    }

    fn envelope(&self, window: &[Sample]) -> SfResult<Vec<Sample>> {
        let n = self.window_size;
        let mut data: Vec<Complex<Sample>> =
            window.iter().map(|&x| Complex::new(x, 0.0)).collect();
        self.fft.fft_complex(&mut data, true)?;

        // Analytic signal: keep DC (and Nyquist for even n), double the
        // positive band, zero the negative band
        let half = n / 2;
        for (k, bin) in data.iter_mut().enumerate() {
            if k == 0 || (n % 2 == 0 && k == half) {
                continue;
            } else if k < half || (n % 2 == 1 && k <= half) {
                *bin *= 2.0;
            } else {
                *bin = Complex::new(0.0, 0.0);
            }
        }
        self.fft.fft_complex(&mut data, false)?;
        Ok(data.iter().map(|c| c.norm()).collect())
    }

    fn ensure_channels(&mut self, channels: usize) {
        if self.buffers.len() != channels {
            self.buffers = (0..channels).map(|_| Vec::new()).collect();
        }
    }
}

impl Stage for HilbertEnvelopeStage {
    fn type_name(&self) -> &'static str {
        "hilbertEnvelope"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(
            self.type_name(),
            json!({
                "windowSize": self.window_size,
                "hopSize": self.hop_size,
            }),
        )
    }

    fn is_resizing(&self) -> bool {
        true
    }

    fn time_scale(&self) -> f64 {
        self.hop_size as f64 / self.window_size as f64
    }

    fn output_frames(&self, input_frames: usize) -> usize {
        let buffered = self.buffers.first().map(Vec::len).unwrap_or(0);
        let total = buffered + input_frames;
        if total < self.window_size {
            0
        } else {
            ((total - self.window_size) / self.hop_size + 1) * self.window_size
        }
    }

    fn process_resizing(
        &mut self,
        input: &[Sample],
        channels: usize,
        _timestamps: &[f32],
        output: &mut Vec<Sample>,
    ) -> SfResult<usize> {
        self.ensure_channels(channels);
        let ws = self.window_size;
        let hop = self.hop_size;

        let mut per_channel: Vec<Vec<Sample>> = Vec::with_capacity(channels);
        for ch in 0..channels {
            let channel_input = sf_core::extract_channel(input, channels, ch);
            let mut buffer = std::mem::take(&mut self.buffers[ch]);
            buffer.extend_from_slice(&channel_input);

            let mut out = Vec::new();
            while buffer.len() >= ws {
                out.extend(self.envelope(&buffer[..ws])?);
                buffer.drain(..hop);
            }
            self.buffers[ch] = buffer;
            per_channel.push(out);
        }

        let frames = per_channel.first().map(Vec::len).unwrap_or(0);
        output.reserve(frames * channels);
        for frame in 0..frames {
            for channel_out in &per_channel {
                output.push(channel_out[frame]);
            }
        }
        Ok(frames)
    }

    fn save_state(&self) -> Value {
        json!({
            "windowSize": self.window_size,
            "channels": self.buffers.len(),
            "buffers": self.buffers.iter().map(|b| samples_to_json(b)).collect::<Vec<_>>(),
        })
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        if state_usize(state, "windowSize")? != self.window_size {
            return Err(SfError::state_mismatch("windowSize", "window size mismatch"));
        }
        Ok(())
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        self.validate_state(state)?;
        let buffers = state
            .get("buffers")
            .and_then(Value::as_array)
            .ok_or_else(|| SfError::state_mismatch("buffers", "missing"))?;
        self.buffers = buffers
            .iter()
            .map(|b| {
                b.as_array()
                    .map(|a| {
                        a.iter()
                            .map(|v| v.as_f64().unwrap_or(0.0) as Sample)
                            .collect()
                    })
                    .ok_or_else(|| SfError::state_mismatch("buffers", "non-array entry"))
            })
            .collect::<SfResult<_>>()?;
        Ok(())
    }

    fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::f32::consts::PI;

    fn ctx() -> Arc<FftContext> {
        Arc::new(FftContext::new())
    }

    fn run_resizing(stage: &mut dyn Stage, input: &[f32]) -> Vec<f32> {
        let mut output = Vec::new();
        let ts: Vec<f32> = (0..input.len()).map(|i| i as f32).collect();
        stage
            .process_resizing(input, 1, &ts, &mut output)
            .unwrap();
        output
    }

    #[test]
    fn test_fft_magnitude_peak_at_tone_bin() {
        let mut s = FftStage::from_params(
            &json!({"size": 64, "type": "rfft", "output": "magnitude"}),
            ctx(),
        )
        .unwrap();
        // 4 cycles in 64 samples lands in bin 4
        let input: Vec<f32> = (0..64)
            .map(|i| (2.0 * PI * 4.0 * i as f32 / 64.0).sin())
            .collect();
        let out = run_resizing(&mut s, &input);
        assert_eq!(out.len(), 33);
        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(peak, 4);
    }

    #[test]
    fn test_fft_complex_layout() {
        let mut s = FftStage::from_params(
            &json!({"size": 8, "type": "rfft", "output": "complex"}),
            ctx(),
        )
        .unwrap();
        let out = run_resizing(&mut s, &[1.0; 8]);
        assert_eq!(out.len(), 10); // (8/2 + 1) * 2
        assert!((out[0] - 8.0).abs() < 1e-4); // DC real part
        assert!(out[1].abs() < 1e-4);
    }

    #[test]
    fn test_fft_rejects_non_pow2_for_radix2() {
        assert!(FftStage::from_params(&json!({"size": 12, "type": "fft"}), ctx()).is_err());
        // dft accepts any size
        assert!(FftStage::from_params(&json!({"size": 12, "type": "dft"}), ctx()).is_ok());
    }

    #[test]
    fn test_fft_zero_pads_short_blocks() {
        let mut s = FftStage::from_params(
            &json!({"size": 16, "type": "rfft", "output": "power"}),
            ctx(),
        )
        .unwrap();
        let out = run_resizing(&mut s, &[1.0, 1.0]);
        assert_eq!(out.len(), 9);
        assert!((out[0] - 4.0).abs() < 1e-3); // DC power = (1+1)^2
    }

    #[test]
    fn test_stft_window_count() {
        let mut s = StftStage::from_params(
            &json!({"windowSize": 8, "hopSize": 4, "window": "hann"}),
            ctx(),
        )
        .unwrap();
        // 16 samples, ws 8, hop 4: floor((16-8)/4)+1 = 3 windows of 5 bins
        let input: Vec<f32> = (0..16).map(|i| i as f32 * 0.1).collect();
        assert_eq!(s.output_frames(16), 15);
        let out = run_resizing(&mut s, &input);
        assert_eq!(out.len(), 15);
    }

    #[test]
    fn test_stft_buffers_across_calls() {
        let mut s = StftStage::from_params(
            &json!({"windowSize": 8, "hopSize": 4}),
            ctx(),
        )
        .unwrap();
        // 5 samples: no full window yet
        let out = run_resizing(&mut s, &[0.1; 5]);
        assert!(out.is_empty());
        // 5 more: 10 buffered => one window emitted, 6 remain buffered
        assert_eq!(s.output_frames(5), 5);
        let out = run_resizing(&mut s, &[0.1; 5]);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_stft_matches_single_block_when_split() {
        let params = json!({"windowSize": 16, "hopSize": 8, "output": "magnitude"});
        let input: Vec<f32> = (0..48).map(|i| (i as f32 * 0.3).sin()).collect();

        let mut whole = StftStage::from_params(&params, ctx()).unwrap();
        let expected = run_resizing(&mut whole, &input);

        let mut split = StftStage::from_params(&params, ctx()).unwrap();
        let mut got = run_resizing(&mut split, &input[..13]);
        got.extend(run_resizing(&mut split, &input[13..30]));
        got.extend(run_resizing(&mut split, &input[30..]));
        assert_eq!(expected.len(), got.len());
        for (a, b) in expected.iter().zip(&got) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_stft_inverse_reconstructs_overlap_added_signal() {
        let analysis = json!({
            "windowSize": 16, "hopSize": 8, "window": "hann", "output": "complex"
        });
        let synthesis = json!({
            "windowSize": 16, "hopSize": 8, "window": "hann",
            "output": "complex", "forward": false
        });
        // Constant input: hann analysis windows at 50% overlap sum to 1
        let input = vec![1.0f32; 64];

        let mut fwd = StftStage::from_params(&analysis, ctx()).unwrap();
        let frames = run_resizing(&mut fwd, &input);
        let mut inv = StftStage::from_params(&synthesis, ctx()).unwrap();
        let rebuilt = run_resizing(&mut inv, &frames);

        // Interior samples (past the first half-window of latency) rebuild
        // the constant
        for &v in &rebuilt[16..rebuilt.len() - 8] {
            assert!((v - 1.0).abs() < 1e-3, "rebuilt {v}");
        }
    }

    #[test]
    fn test_hilbert_envelope_of_tone_is_flat() {
        let mut s = HilbertEnvelopeStage::from_params(
            &json!({"windowSize": 64, "hopSize": 64}),
            ctx(),
        )
        .unwrap();
        // 8 cycles per window: envelope of a pure tone is its amplitude
        let input: Vec<f32> = (0..64)
            .map(|i| 0.5 * (2.0 * PI * 8.0 * i as f32 / 64.0).sin())
            .collect();
        let out = run_resizing(&mut s, &input);
        assert_eq!(out.len(), 64);
        for &v in &out {
            assert!((v - 0.5).abs() < 0.02, "envelope {v}");
        }
    }

    #[test]
    fn test_hilbert_output_size_rule() {
        let mut s = HilbertEnvelopeStage::from_params(
            &json!({"windowSize": 8, "hopSize": 4}),
            ctx(),
        )
        .unwrap();
        assert_eq!(s.output_frames(16), 24); // 3 windows of 8
        let out = run_resizing(&mut s, &vec![0.3; 16]);
        assert_eq!(out.len(), 24);
    }

    #[test]
    fn test_stft_state_roundtrip() {
        let params = json!({"windowSize": 8, "hopSize": 4});
        let mut a = StftStage::from_params(&params, ctx()).unwrap();
        run_resizing(&mut a, &[0.2; 6]);
        let state = a.save_state();

        let mut b = StftStage::from_params(&params, ctx()).unwrap();
        b.restore_state(&state).unwrap();
        let x: Vec<f32> = (0..10).map(|i| i as f32 * 0.05).collect();
        assert_eq!(run_resizing(&mut a, &x), run_resizing(&mut b, &x));
    }

    #[test]
    fn test_stft_restore_rejects_different_window() {
        let a = StftStage::from_params(&json!({"windowSize": 8, "hopSize": 4}), ctx()).unwrap();
        let state = a.save_state();
        let mut b =
            StftStage::from_params(&json!({"windowSize": 16, "hopSize": 4}), ctx()).unwrap();
        assert!(b.restore_state(&state).is_err());
    }
}
