//! sf-stages: Stage library for StreamForge pipelines
//!
//! Every algorithmic element of a pipeline implements the [`Stage`] trait:
//! a stable type identifier, an in-place or resizing process entry point,
//! private-state (de)serialization and a deterministic reset.
//!
//! ## Stage Modules
//! - `window` - Shared sliding-window primitive (sample/time indexed)
//! - `stats` - Moving average, RMS, variance, MAV, Z-score
//! - `features` - Waveform length, SSC, WAMP, sliding linear regression
//! - `adaptive` - LMS/NLMS/leaky LMS and RLS adaptive filters
//! - `convolution` - Fixed-kernel convolution (direct / overlap-save FFT)
//! - `resample` - Polyphase interpolator, decimator, rational resampler
//! - `spectral` - FFT, STFT, Hilbert envelope
//! - `wavelet` - One-level DWT (haar, db1..db10)
//! - `transform` - Pre-trained matrix transforms (PCA/ICA/whitening/CSP)
//! - `spatial` - GSC preprocessor, channel selector/select/merge
//! - `shaping` - Rectify, differentiator, leaky integrator
//! - `detect` - Clip detection, peak detection, dual-window SNR

pub mod adaptive;
pub mod convolution;
pub mod detect;
pub mod features;
pub mod params;
pub mod registry;
pub mod resample;
pub mod shaping;
pub mod spatial;
pub mod spectral;
pub mod stats;
pub mod transform;
pub mod wavelet;
pub mod window;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sf_core::{Sample, SfError, SfResult};
use sf_event::LogLevel;

pub use registry::create_stage;

// ============ Stage Events ============

/// Diagnostic emitted by a stage during one process call
///
/// The executor drains these after each stage and turns them into ring
/// records under `pipeline.stage.<type>.<category>`.
#[derive(Debug, Clone)]
pub struct StageEvent {
    pub level: LogLevel,
    pub category: &'static str,
    pub message: String,
}

impl StageEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Error,
            category: "error",
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Warn,
            category: "warn",
            message: message.into(),
        }
    }
}

// ============ Descriptor ============

/// Structural identity of a configured stage
///
/// Two pipeline positions are checkpoint-compatible when their descriptors
/// are equal: same type and same critical configuration (window sizes, taps,
/// factors, channel expectations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub stage_type: String,
    pub config: Value,
}

impl StageDescriptor {
    pub fn new(stage_type: &str, config: Value) -> Self {
        Self {
            stage_type: stage_type.to_string(),
            config,
        }
    }
}

// ============ Stage Trait ============

/// One algorithmic element in a pipeline
///
/// Non-resizing stages mutate the interleaved block in place and must not
/// change its length. Resizing stages produce a new block through
/// `process_resizing`; `output_frames` predicts the output frame count for
/// the stage's *current* internal state, and `time_scale` relates output to
/// input sample spacing.
pub trait Stage: Send {
    /// Stable type identifier (wire name)
    fn type_name(&self) -> &'static str;

    /// Structural identity for checkpoint matching and `list_state`
    fn descriptor(&self) -> StageDescriptor;

    fn is_resizing(&self) -> bool {
        false
    }

    /// Output sample spacing as a multiple of input spacing
    fn time_scale(&self) -> f64 {
        1.0
    }

    /// Output frame count for `input_frames` input frames, given current state
    fn output_frames(&self, input_frames: usize) -> usize {
        input_frames
    }

    /// Channel count this stage emits for `input_channels` inputs
    ///
    /// Channel-geometry stages (matrix transforms, channel routing, SNR)
    /// narrow or rearrange the interleaved layout; everything else passes
    /// the count through. A stage returning a different count is dispatched
    /// through `process_resizing` even when the frame count is unchanged.
    fn output_channels(&self, input_channels: usize) -> usize {
        input_channels
    }

    /// Exact channel count this stage requires, if any
    fn required_channels(&self) -> Option<usize> {
        None
    }

    /// In-place processing for non-resizing stages
    ///
    /// `block.len()` is frames * channels; `timestamps` has one entry per
    /// frame.
    fn process(
        &mut self,
        block: &mut [Sample],
        channels: usize,
        timestamps: &[f32],
    ) -> SfResult<()> {
        let _ = (block, channels, timestamps);
        Err(SfError::KernelFailure(format!(
            "stage `{}` does not process in place",
            self.type_name()
        )))
    }

    /// Resizing processing; appends `output_frames(n) * out_channels` samples
    /// into `output` and returns the emitted frame count
    fn process_resizing(
        &mut self,
        input: &[Sample],
        channels: usize,
        timestamps: &[f32],
        output: &mut Vec<Sample>,
    ) -> SfResult<usize> {
        let _ = (input, channels, timestamps, output);
        Err(SfError::KernelFailure(format!(
            "stage `{}` is not a resizing stage",
            self.type_name()
        )))
    }

    /// Serialize private state into a checkpoint sub-document
    fn save_state(&self) -> Value;

    /// Check a state sub-document against this stage's structural invariants
    /// without mutating anything
    fn validate_state(&self, state: &Value) -> SfResult<()>;

    /// Apply a previously validated state sub-document
    fn restore_state(&mut self, state: &Value) -> SfResult<()>;

    /// Clear all private state
    fn reset(&mut self);

    /// Drain diagnostics produced by the last process call
    fn drain_events(&mut self) -> Vec<StageEvent> {
        Vec::new()
    }
}

/// Boxed stage, the unit the executor dispatches over
pub type BoxedStage = Box<dyn Stage + Send>;
