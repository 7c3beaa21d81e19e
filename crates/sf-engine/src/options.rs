//! Per-call processing options and the time base

/// Default drift threshold in percent
pub const DEFAULT_DRIFT_THRESHOLD_PERCENT: f32 = 2.0;

/// Where the per-frame timestamps come from
#[derive(Debug, Clone, Copy)]
pub enum TimeBase<'a> {
    /// Caller-supplied milliseconds, one per frame, non-decreasing
    Timestamps(&'a [f32]),
    /// Synthesize uniform timestamps from a rate in Hz; the synthesized
    /// clock continues across calls
    SampleRate(f32),
}

/// Options for one `process` call
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Interleaved channel count of the submitted block
    pub channels: usize,
    /// Expected sample rate in Hz; required for drift detection
    pub sample_rate: Option<f32>,
    /// Run the drift pre-pass over explicit timestamps
    pub detect_drift: bool,
    /// Relative drift threshold in percent
    pub drift_threshold_percent: f32,
}

impl ProcessOptions {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            sample_rate: None,
            detect_drift: false,
            drift_threshold_percent: DEFAULT_DRIFT_THRESHOLD_PERCENT,
        }
    }

    pub fn with_sample_rate(mut self, hz: f32) -> Self {
        self.sample_rate = Some(hz);
        self
    }

    pub fn with_drift_detection(mut self, threshold_percent: f32) -> Self {
        self.detect_drift = true;
        self.drift_threshold_percent = threshold_percent;
        self
    }
}
