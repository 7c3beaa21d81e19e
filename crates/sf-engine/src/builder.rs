//! Fluent pipeline builder
//!
//! Validates per-stage parameters as stages are appended and stays fluent
//! by deferring the first error to `build()`. Construction-time rejections
//! carry the offending field via `SfError::InvalidParameter`.

use std::sync::Arc;

use serde_json::Value;

use sf_core::{SfError, SfResult};
use sf_dsp::FftContext;
use sf_event::{Observer, TapCallback};

use crate::pipeline::Pipeline;

/// Deferred-error fluent builder for [`Pipeline`]
pub struct PipelineBuilder {
    pipeline: Pipeline,
    error: Option<SfError>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_context(name, Arc::new(FftContext::new()))
    }

    /// Share one FFT context across pipelines
    pub fn with_context(name: impl Into<String>, fft: Arc<FftContext>) -> Self {
        Self {
            pipeline: Pipeline::new(name, fft),
            error: None,
        }
    }

    /// Declare the channel count the pipeline will be driven with
    pub fn channels(mut self, channels: usize) -> Self {
        if self.error.is_none() {
            if channels == 0 {
                self.error = Some(SfError::invalid_param("channels", "must be >= 1"));
            } else {
                self.pipeline.set_channels(channels);
            }
        }
        self
    }

    /// Append a stage; parameter validation happens immediately
    pub fn stage(mut self, type_name: &str, params: Value) -> Self {
        if self.error.is_none() {
            if let Err(error) = self.pipeline.add_stage(type_name, &params) {
                self.error = Some(error);
            }
        }
        self
    }

    /// Attach a tap to the most recently added stage
    pub fn tap(mut self, callback: TapCallback) -> Self {
        if self.error.is_none() {
            if let Err(error) = self.pipeline.tap_last(callback) {
                self.error = Some(error);
            }
        }
        self
    }

    /// Install the observer callback set
    pub fn observer(mut self, observer: Observer) -> Self {
        if self.error.is_none() {
            self.pipeline.set_observer(observer);
        }
        self
    }

    /// Surface the first deferred error, or the assembled pipeline
    pub fn build(self) -> SfResult<Pipeline> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.pipeline),
        }
    }
}
