//! Polyphase FIR resampling stages
//!
//! One polyphase core drives all three wire types:
//! - `interpolator` (up by L): anti-imaging lowpass, emits L*n frames
//! - `decimator` (down by M): anti-aliasing lowpass, emits ceil(n/M) frames
//! - `resampler` (L/M reduced by gcd): both at once
//!
//! The prototype is a Hamming-windowed sinc, `order` taps (default 51) per
//! polyphase branch, cutoff at the tighter of the two Nyquist limits,
//! DC-normalized so a constant stream passes at unit gain. Global
//! input/output positions are tracked across calls, so per-call output
//! counts follow the stream exactly and concatenated blocks are
//! bit-identical to one big block.

use std::f64::consts::PI;

use serde_json::{json, Value};

use sf_core::{Sample, SfError, SfResult};

use crate::params::{opt_usize, req_usize, samples_to_json, state_usize};
use crate::{Stage, StageDescriptor};

/// Default prototype filter length (odd)
const DEFAULT_ORDER: usize = 51;

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Hamming-windowed sinc lowpass at the upsampled rate
///
/// `order` is taps per polyphase branch, so the prototype length scales
/// with the wider of the two factors and every branch stays populated.
/// Cutoff sits at the tighter Nyquist limit (`1 / (2 * band)` cycles per
/// upsampled sample); DC gain is `up` to undo the zero-stuffing loss.
fn design_lowpass(order: usize, band: usize, up: usize) -> Vec<f64> {
    let length = order * band;
    let center = (length - 1) as f64 / 2.0;
    let fc = 0.5 / band as f64;
    let mut taps: Vec<f64> = (0..length)
        .map(|k| {
            let t = k as f64 - center;
            let sinc = if t.abs() < 1e-12 {
                2.0 * fc
            } else {
                (2.0 * PI * fc * t).sin() / (PI * t)
            };
            let window = 0.54 - 0.46 * (2.0 * PI * k as f64 / (length - 1) as f64).cos();
            sinc * window
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    let norm = up as f64 / sum;
    for tap in &mut taps {
        *tap *= norm;
    }
    taps
}

// ============ Polyphase Core ============

/// Shared rational L/M polyphase engine
///
/// Output frame j corresponds to upsampled position j*M: input index
/// `m = j*M / L`, polyphase branch `p = j*M mod L`.
struct PolyphaseCore {
    up: usize,
    down: usize,
    taps: Vec<f64>,
    /// Subfilter length: ceil(taps / up)
    sub_len: usize,
    /// Per-channel trailing input samples (sub_len - 1 each)
    histories: Vec<Vec<Sample>>,
    in_pos: u64,
    out_pos: u64,
}

impl PolyphaseCore {
    fn new(up: usize, down: usize, order: usize) -> Self {
        let band = up.max(down);
        let taps = design_lowpass(order, band, up);
        let sub_len = taps.len().div_ceil(up);
        Self {
            up,
            down,
            taps,
            sub_len,
            histories: Vec::new(),
            in_pos: 0,
            out_pos: 0,
        }
    }

    fn ensure_channels(&mut self, channels: usize) {
        if self.histories.len() != channels {
            self.histories = (0..channels).map(|_| vec![0.0; self.sub_len - 1]).collect();
        }
    }

    /// Output frames the next `input_frames` input frames will yield
    fn pending_output(&self, input_frames: usize) -> usize {
        let total_in = self.in_pos + input_frames as u64;
        let up = self.up as u64;
        let down = self.down as u64;
        let j_end = (total_in * up).div_ceil(down);
        (j_end - self.out_pos) as usize
    }

    /// Resample one deinterleaved channel; emits `pending_output` samples
    fn run_channel(&self, channel: usize, input: &[Sample], output: &mut Vec<Sample>) {
        let history = &self.histories[channel];
        let hist_len = history.len() as i64;

        let emit = self.pending_output(input.len());
        let up = self.up as u64;
        let down = self.down as u64;

        for j in self.out_pos..self.out_pos + emit as u64 {
            let upsampled = j * down;
            let m = (upsampled / up) as i64;
            let phase = (upsampled % up) as usize;

            let mut acc = 0.0f64;
            let mut tap = phase;
            let mut i = 0i64;
            while tap < self.taps.len() {
                // x[m - i]: history holds the sub_len-1 frames before in_pos
                let src = m - i - self.in_pos as i64 + hist_len;
                if src >= 0 {
                    let x = if (src as usize) < history.len() {
                        history[src as usize]
                    } else {
                        input[src as usize - history.len()]
                    };
                    acc += self.taps[tap] * x as f64;
                }
                tap += self.up;
                i += 1;
            }
            output.push(acc as Sample);
        }
    }

    fn advance(&mut self, channels: usize, deinterleaved: &[Vec<Sample>], emitted: usize) {
        let frames = deinterleaved.first().map(|c| c.len()).unwrap_or(0);
        let keep = self.sub_len - 1;
        for ch in 0..channels {
            let history = &mut self.histories[ch];
            let input = &deinterleaved[ch];
            if frames >= keep {
                history.copy_from_slice(&input[frames - keep..]);
            } else {
                history.rotate_left(frames.min(keep));
                let start = keep - frames;
                history[start..].copy_from_slice(input);
            }
        }
        self.in_pos += frames as u64;
        self.out_pos += emitted as u64;
    }

    fn reset(&mut self) {
        for history in &mut self.histories {
            history.fill(0.0);
        }
        self.in_pos = 0;
        self.out_pos = 0;
    }

    fn save_state(&self) -> Value {
        json!({
            "up": self.up,
            "down": self.down,
            "inPos": self.in_pos,
            "outPos": self.out_pos,
            "channels": self.histories.len(),
            "histories": self.histories.iter().map(|h| samples_to_json(h)).collect::<Vec<_>>(),
        })
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        if state_usize(state, "up")? != self.up || state_usize(state, "down")? != self.down {
            return Err(SfError::state_mismatch("up", "resampling ratio mismatch"));
        }
        let histories = state
            .get("histories")
            .and_then(Value::as_array)
            .ok_or_else(|| SfError::state_mismatch("histories", "missing"))?;
        for history in histories {
            let len = history.as_array().map(|a| a.len()).unwrap_or(usize::MAX);
            if len != self.sub_len - 1 {
                return Err(SfError::state_mismatch(
                    "histories",
                    "history length disagrees with filter order",
                ));
            }
        }
        Ok(())
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
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
        self.in_pos = state_usize(state, "inPos")? as u64;
        self.out_pos = state_usize(state, "outPos")? as u64;
        Ok(())
    }
}

// ============ Stage Wrappers ============

/// Which wire type a `ResampleStage` presents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleKind {
    Interpolate,
    Decimate,
    Rational,
}

impl ResampleKind {
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Interpolate => "interpolator",
            Self::Decimate => "decimator",
            Self::Rational => "resampler",
        }
    }
}

/// Polyphase resampling stage
pub struct ResampleStage {
    kind: ResampleKind,
    order: usize,
    core: PolyphaseCore,
}

impl ResampleStage {
    pub fn from_params(kind: ResampleKind, params: &Value) -> SfResult<Self> {
        let order = opt_usize(params, "order")?.unwrap_or(DEFAULT_ORDER);
        if order < 3 || order % 2 == 0 {
            return Err(SfError::invalid_param("order", "must be odd and >= 3"));
        }

        let (up, down) = match kind {
            ResampleKind::Interpolate => {
                let factor = req_usize(params, "factor")?;
                if factor < 2 {
                    return Err(SfError::invalid_param("factor", "must be an integer >= 2"));
                }
                (factor, 1)
            }
            ResampleKind::Decimate => {
                let factor = req_usize(params, "factor")?;
                if factor < 2 {
                    return Err(SfError::invalid_param("factor", "must be an integer >= 2"));
                }
                (1, factor)
            }
            ResampleKind::Rational => {
                let up = req_usize(params, "upFactor")?;
                let down = req_usize(params, "downFactor")?;
                if up == 0 {
                    return Err(SfError::invalid_param("upFactor", "must be positive"));
                }
                if down == 0 {
                    return Err(SfError::invalid_param("downFactor", "must be positive"));
                }
                let g = gcd(up, down);
                (up / g, down / g)
            }
        };

        Ok(Self {
            kind,
            order,
            core: PolyphaseCore::new(up, down, order),
        })
    }
}

impl Stage for ResampleStage {
    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(
            self.type_name(),
            json!({
                "up": self.core.up,
                "down": self.core.down,
                "order": self.order,
            }),
        )
    }

    fn is_resizing(&self) -> bool {
        true
    }

    fn time_scale(&self) -> f64 {
        self.core.down as f64 / self.core.up as f64
    }

    fn output_frames(&self, input_frames: usize) -> usize {
        self.core.pending_output(input_frames)
    }

    fn process_resizing(
        &mut self,
        input: &[Sample],
        channels: usize,
        _timestamps: &[f32],
        output: &mut Vec<Sample>,
    ) -> SfResult<usize> {
        self.core.ensure_channels(channels);
        let frames = input.len() / channels;
        let emit = self.core.pending_output(frames);

        let deinterleaved: Vec<Vec<Sample>> = (0..channels)
            .map(|ch| sf_core::extract_channel(input, channels, ch))
            .collect();

        let mut per_channel: Vec<Vec<Sample>> = Vec::with_capacity(channels);
        for ch in 0..channels {
            let mut out = Vec::with_capacity(emit);
            self.core.run_channel(ch, &deinterleaved[ch], &mut out);
            per_channel.push(out);
        }
        self.core.advance(channels, &deinterleaved, emit);

        output.reserve(emit * channels);
        for frame in 0..emit {
            for channel_out in &per_channel {
                output.push(channel_out[frame]);
            }
        }
        Ok(emit)
    }

    fn save_state(&self) -> Value {
        self.core.save_state()
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        self.core.validate_state(state)
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        self.core.restore_state(state)
    }

    fn reset(&mut self) {
        self.core.reset();
    }
}
