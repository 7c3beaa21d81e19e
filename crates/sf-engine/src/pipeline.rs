//! Pipeline executor
//!
//! Owns the ordered stage list and drives each block through it:
//! channel validation, timestamp normalization, drift pre-pass, per-stage
//! dispatch (in-place vs resizing), event collection, callback delivery and
//! the per-call log-ring flush.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};

use sf_core::{
    check_geometry, rescale_timestamps, Sample, SfError, SfResult, LOG_RING_CAPACITY,
};
use sf_dsp::FftContext;
use sf_event::{DriftDetector, LogLevel, LogRecord, LogRing, Observer, TapCallback};
use sf_stages::{create_stage, BoxedStage, StageEvent};
use sf_state::{Checkpoint, StageCheckpoint};

use crate::options::{ProcessOptions, TimeBase};

// ============ Summary ============

/// One stage's row in `list_state`
#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub stage_type: String,
    pub config: Value,
    pub resizing: bool,
    pub time_scale: f64,
}

/// Lightweight pipeline description with no private-state dumps
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub name: String,
    pub channels: Option<usize>,
    pub stage_count: usize,
    pub log_ring_capacity: usize,
    pub stages: Vec<StageSummary>,
}

// ============ Pipeline ============

/// A linear chain of stages with observability attached
pub struct Pipeline {
    name: String,
    /// Declared channel expectation; checked at `process` entry when set
    channels: Option<usize>,
    stages: Vec<BoxedStage>,
    taps: Vec<Option<TapCallback>>,
    observer: Observer,
    ring: LogRing,
    drift: Option<DriftDetector>,
    fft: Arc<FftContext>,
    /// Origin for monotonic record timestamps
    clock: Instant,
    /// Continuation point for synthesized timestamps, ms
    stream_clock_ms: f64,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, fft: Arc<FftContext>) -> Self {
        Self {
            name: name.into(),
            channels: None,
            stages: Vec::new(),
            taps: Vec::new(),
            observer: Observer::new(),
            ring: LogRing::new(LOG_RING_CAPACITY),
            drift: None,
            fft,
            clock: Instant::now(),
            stream_clock_ms: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Declare the channel count this pipeline expects
    pub fn set_channels(&mut self, channels: usize) {
        self.channels = Some(channels);
    }

    /// Replace the observer configuration
    pub fn set_observer(&mut self, observer: Observer) {
        self.observer = observer;
    }

    /// Append a configured stage
    pub fn add_stage(&mut self, type_name: &str, params: &Value) -> SfResult<()> {
        let stage = create_stage(type_name, params, &self.fft)?;
        self.stages.push(stage);
        self.taps.push(None);
        Ok(())
    }

    /// Attach a tap to the most recently added stage
    pub fn tap_last(&mut self, callback: TapCallback) -> SfResult<()> {
        match self.taps.last_mut() {
            Some(slot) => {
                *slot = Some(callback);
                Ok(())
            }
            None => Err(SfError::invalid_param("tap", "no stage to attach to")),
        }
    }

    // ============ Processing ============

    /// Drive one block through every stage
    ///
    /// The buffer is mutated in place when every stage preserves geometry;
    /// a resizing stage swaps in a fresh buffer of the new length. Returns
    /// the frame count of the final block.
    pub fn process(
        &mut self,
        block: &mut Vec<Sample>,
        timebase: TimeBase<'_>,
        options: &ProcessOptions,
    ) -> SfResult<usize> {
        let call_start = Instant::now();
        let result = self.run(block, timebase, options);

        if let Err(error) = &result {
            log::error!("pipeline `{}` failed: {error}", self.name);
            let record = LogRecord::new("pipeline.error", LogLevel::Error, error.to_string())
                .stamped(self.clock);
            self.ring.push(record);
        }

        self.deliver_callbacks(block, options, call_start);
        self.flush_ring();
        result
    }

    /// Clone-then-process convenience; the input buffer is left untouched
    pub fn process_copy(
        &mut self,
        block: &[Sample],
        timebase: TimeBase<'_>,
        options: &ProcessOptions,
    ) -> SfResult<Vec<Sample>> {
        let mut owned = block.to_vec();
        self.process(&mut owned, timebase, options)?;
        Ok(owned)
    }

    fn run(
        &mut self,
        block: &mut Vec<Sample>,
        timebase: TimeBase<'_>,
        options: &ProcessOptions,
    ) -> SfResult<usize> {
        if options.channels == 0 {
            return Err(SfError::invalid_param("channels", "must be >= 1"));
        }
        if let Some(expected) = self.channels {
            if options.channels != expected {
                return Err(SfError::ChannelMismatch {
                    expected,
                    got: options.channels,
                });
            }
        }
        let mut frames = check_geometry(block.len(), options.channels)?;
        let mut timestamps = self.normalize_timestamps(frames, timebase, options)?;
        let mut channels = options.channels;

        for index in 0..self.stages.len() {
            let stage_start = Instant::now();
            let stage = &mut self.stages[index];
            let type_name = stage.type_name();

            if let Some(required) = stage.required_channels() {
                if required != channels {
                    self.ring.push(
                        LogRecord::new(
                            format!("pipeline.stage.{type_name}.error"),
                            LogLevel::Error,
                            format!("stage expects {required} channels, stream has {channels}"),
                        )
                        .stamped(self.clock),
                    );
                    return Err(SfError::ChannelMismatch {
                        expected: required,
                        got: channels,
                    });
                }
            }

            let out_channels = stage.output_channels(channels);
            if stage.is_resizing() || out_channels != channels {
                let predicted = stage.output_frames(frames);
                let mut resized = Vec::new();
                let emitted =
                    match stage.process_resizing(block, channels, &timestamps, &mut resized) {
                        Ok(emitted) => emitted,
                        Err(error) => {
                            // Fatal stage failures clear that stage's state only
                            stage.reset();
                            return Err(error);
                        }
                    };
                if emitted != predicted {
                    return Err(SfError::KernelFailure(format!(
                        "stage `{type_name}` emitted {emitted} frames, predicted {predicted}"
                    )));
                }
                *block = resized;
                if emitted != frames {
                    timestamps = rescale_timestamps(&timestamps, emitted, stage.time_scale());
                }
                frames = emitted;
                channels = out_channels;
            } else if let Err(error) = stage.process(block, channels, &timestamps) {
                stage.reset();
                return Err(error);
            }

            let duration_ms = stage_start.elapsed().as_secs_f64() * 1000.0;
            self.ring.push(
                LogRecord::new(
                    format!("pipeline.stage.{type_name}.performance"),
                    LogLevel::Debug,
                    format!("processed {frames} frames"),
                )
                .with_context("durationMs", json!(duration_ms))
                .with_context("frames", json!(frames))
                .stamped(self.clock),
            );

            let events = self.stages[index].drain_events();
            self.record_stage_events(type_name, events);

            let mut tap_failed = false;
            if let Some(tap) = self.taps.get_mut(index).and_then(Option::as_mut) {
                let data: &[Sample] = block;
                if catch_unwind(AssertUnwindSafe(|| tap(type_name, data))).is_err() {
                    tap_failed = true;
                }
            }
            if tap_failed {
                self.note_callback_failure("tap");
            }
        }
        Ok(frames)
    }

    fn normalize_timestamps(
        &mut self,
        frames: usize,
        timebase: TimeBase<'_>,
        options: &ProcessOptions,
    ) -> SfResult<Vec<f32>> {
        match timebase {
            TimeBase::Timestamps(ts) => {
                if ts.len() != frames {
                    return Err(SfError::invalid_param(
                        "timestamps",
                        format!("{} entries for {frames} frames", ts.len()),
                    ));
                }
                if options.detect_drift {
                    if let Some(sample_rate) = options.sample_rate {
                        self.drift_prepass(ts, sample_rate, options.drift_threshold_percent);
                    }
                }
                Ok(ts.to_vec())
            }
            TimeBase::SampleRate(hz) => {
                if hz <= 0.0 {
                    return Err(SfError::invalid_param("sampleRate", "must be positive"));
                }
                let start = self.stream_clock_ms;
                let period = 1000.0 / hz as f64;
                self.stream_clock_ms += frames as f64 * period;
                Ok((0..frames)
                    .map(|i| (start + i as f64 * period) as f32)
                    .collect())
            }
        }
    }

    fn drift_prepass(&mut self, timestamps: &[f32], sample_rate: f32, threshold_percent: f32) {
        let expected_period = 1000.0 / sample_rate;
        let needs_new = self
            .drift
            .as_ref()
            .map(|d| {
                (d.expected_period_ms() - expected_period).abs() > 1e-6
                    || (d.threshold_fraction() - threshold_percent / 100.0).abs() > 1e-9
            })
            .unwrap_or(true);
        if needs_new {
            self.drift = Some(DriftDetector::new(sample_rate, threshold_percent));
        }

        // Split the borrow: the detector walks timestamps while events go to
        // the ring and the drift sink
        let mut detector = self.drift.take().expect("detector installed above");
        let mut events = Vec::new();
        detector.check(timestamps, |event| events.push(event.clone()));
        self.drift = Some(detector);

        for event in events {
            self.ring.push(
                LogRecord::new(
                    "pipeline.drift",
                    LogLevel::Warn,
                    format!(
                        "timestamp drift {:.2}% at sample {}",
                        event.relative_drift * 100.0,
                        event.sample_index
                    ),
                )
                .with_context("absoluteDriftMs", json!(event.absolute_drift_ms))
                .with_context("relativeDrift", json!(event.relative_drift))
                .stamped(self.clock),
            );
            let mut drift_sink_failed = false;
            if let Some(on_drift) = self.observer.on_drift.as_mut() {
                if catch_unwind(AssertUnwindSafe(|| on_drift(&event))).is_err() {
                    drift_sink_failed = true;
                }
            }
            if drift_sink_failed {
                self.note_callback_failure("on_drift");
            }
        }
    }

    fn record_stage_events(&mut self, type_name: &str, events: Vec<StageEvent>) {
        for event in events {
            let topic = format!("pipeline.stage.{type_name}.{}", event.category);
            self.ring.push(
                LogRecord::new(topic, event.level, event.message.clone()).stamped(self.clock),
            );
            if event.level >= LogLevel::Error {
                let mut sink_failed = false;
                if let Some(on_error) = self.observer.on_error.as_mut() {
                    let message = event.message.clone();
                    if catch_unwind(AssertUnwindSafe(|| on_error(type_name, &message))).is_err() {
                        sink_failed = true;
                    }
                }
                if sink_failed {
                    self.note_callback_failure("on_error");
                }
            }
        }
    }

    fn deliver_callbacks(
        &mut self,
        block: &[Sample],
        options: &ProcessOptions,
        call_start: Instant,
    ) {
        let mut failed = Vec::new();
        if let Some(on_batch) = self.observer.on_batch.as_mut() {
            let name = self.name.as_str();
            let count = block.len() / options.channels.max(1);
            if catch_unwind(AssertUnwindSafe(|| on_batch(name, block, 0, count))).is_err() {
                failed.push("on_batch");
            }
        }
        if let Some(on_complete) = self.observer.on_stage_complete.as_mut() {
            let name = self.name.as_str();
            let duration_ms = call_start.elapsed().as_secs_f64() * 1000.0;
            if catch_unwind(AssertUnwindSafe(|| on_complete(name, duration_ms))).is_err() {
                failed.push("on_stage_complete");
            }
        }
        for which in failed {
            self.note_callback_failure(which);
        }
    }

    fn note_callback_failure(&mut self, which: &str) {
        let error = SfError::CallbackFailure {
            topic: "pipeline.callback.error".into(),
            detail: format!("callback `{which}` panicked"),
        };
        log::error!("{error}; pipeline continues");
        self.ring.push(
            LogRecord::new("pipeline.callback.error", LogLevel::Error, error.to_string())
                .stamped(self.clock),
        );
    }

    /// Drain the ring through the topic filter into the log sinks
    fn flush_ring(&mut self) {
        if self.ring.is_empty() {
            return;
        }
        let records = self.ring.drain();
        if !self.observer.wants_logs() {
            return;
        }
        let filtered: Vec<LogRecord> = records
            .into_iter()
            .filter(|r| self.observer.topic_filter.matches(&r.topic))
            .collect();
        if filtered.is_empty() {
            return;
        }

        let mut failed = false;
        if let Some(on_log) = self.observer.on_log.as_mut() {
            for record in &filtered {
                if catch_unwind(AssertUnwindSafe(|| on_log(record))).is_err() {
                    failed = true;
                    break;
                }
            }
        }
        if let Some(on_log_batch) = self.observer.on_log_batch.as_mut() {
            let batch: &[LogRecord] = &filtered;
            if catch_unwind(AssertUnwindSafe(|| on_log_batch(batch))).is_err() {
                failed = true;
            }
        }
        if failed {
            self.note_callback_failure("on_log");
        }
    }

    // ============ State Protocol ============

    /// Serialize the pipeline and every stage's private state
    pub fn save_state(&self) -> SfResult<String> {
        let stages = self
            .stages
            .iter()
            .map(|stage| {
                let descriptor = stage.descriptor();
                StageCheckpoint {
                    stage_type: descriptor.stage_type,
                    config: descriptor.config,
                    state: stage.save_state(),
                }
            })
            .collect();
        Checkpoint::new(self.channels, stages).to_json()
    }

    /// Restore a checkpoint onto this pipeline
    ///
    /// Two-phase: structural match and per-stage validation first (all
    /// read-only), then apply. A failing load leaves the pipeline unchanged.
    pub fn load_state(&mut self, text: &str) -> SfResult<()> {
        let checkpoint = Checkpoint::from_json(text)?;
        if checkpoint.stage_count != self.stages.len() {
            return Err(SfError::state_mismatch(
                "stage_count",
                format!(
                    "checkpoint has {} stages, pipeline has {}",
                    checkpoint.stage_count,
                    self.stages.len()
                ),
            ));
        }
        if checkpoint.channels != self.channels {
            return Err(SfError::state_mismatch(
                "channels",
                format!(
                    "checkpoint declares {:?} channels, pipeline declares {:?}",
                    checkpoint.channels, self.channels
                ),
            ));
        }
        for (index, (stage, entry)) in self.stages.iter().zip(&checkpoint.stages).enumerate() {
            let descriptor = stage.descriptor();
            if descriptor.stage_type != entry.stage_type {
                return Err(SfError::state_mismatch(
                    format!("stages[{index}].type"),
                    format!(
                        "checkpoint has `{}`, pipeline has `{}`",
                        entry.stage_type, descriptor.stage_type
                    ),
                ));
            }
            if descriptor.config != entry.config {
                return Err(SfError::state_mismatch(
                    format!("stages[{index}].config"),
                    "critical configuration differs".to_string(),
                ));
            }
            stage.validate_state(&entry.state)?;
        }
        for (stage, entry) in self.stages.iter_mut().zip(&checkpoint.stages) {
            stage.restore_state(&entry.state)?;
        }
        Ok(())
    }

    /// Reset every stage and the synthesized clock
    pub fn clear_state(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
        if let Some(drift) = self.drift.as_mut() {
            drift.reset();
        }
        self.stream_clock_ms = 0.0;
    }

    /// Describe the pipeline without dumping private state
    pub fn list_state(&self) -> PipelineSummary {
        PipelineSummary {
            name: self.name.clone(),
            channels: self.channels,
            stage_count: self.stages.len(),
            log_ring_capacity: self.ring.capacity(),
            stages: self
                .stages
                .iter()
                .map(|stage| {
                    let descriptor = stage.descriptor();
                    StageSummary {
                        stage_type: descriptor.stage_type,
                        config: descriptor.config,
                        resizing: stage.is_resizing(),
                        time_scale: stage.time_scale(),
                    }
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("channels", &self.channels)
            .field("stages", &self.stages.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pipeline_with(stages: &[(&str, Value)]) -> Pipeline {
        let mut pipeline = Pipeline::new("test", Arc::new(FftContext::new()));
        for (name, params) in stages {
            pipeline.add_stage(name, params).unwrap();
        }
        pipeline
    }

    #[test]
    fn test_empty_pipeline_passthrough() {
        let mut p = pipeline_with(&[]);
        let mut block = vec![1.0, 2.0, 3.0];
        let frames = p
            .process(&mut block, TimeBase::SampleRate(1000.0), &ProcessOptions::new(1))
            .unwrap();
        assert_eq!(frames, 3);
        assert_eq!(block, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_channel_expectation_enforced() {
        let mut p = pipeline_with(&[("rectify", json!({"mode": "full"}))]);
        p.set_channels(2);
        let mut block = vec![-1.0, -2.0, -3.0];
        let result = p.process(
            &mut block,
            TimeBase::SampleRate(1000.0),
            &ProcessOptions::new(3),
        );
        assert!(matches!(
            result,
            Err(SfError::ChannelMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn test_required_channels_checked_mid_chain() {
        // LMS needs a 2-channel stream
        let mut p = pipeline_with(&[("lmsFilter", json!({"numTaps": 4}))]);
        let mut block = vec![0.0; 9];
        let result = p.process(
            &mut block,
            TimeBase::SampleRate(100.0),
            &ProcessOptions::new(3),
        );
        assert!(matches!(result, Err(SfError::ChannelMismatch { .. })));
    }

    #[test]
    fn test_resizing_swaps_buffer_and_frames() {
        let mut p = pipeline_with(&[("interpolator", json!({"factor": 2}))]);
        let mut block = vec![0.5; 8];
        let frames = p
            .process(&mut block, TimeBase::SampleRate(100.0), &ProcessOptions::new(1))
            .unwrap();
        assert_eq!(frames, 16);
        assert_eq!(block.len(), 16);
    }

    #[test]
    fn test_channel_narrowing_through_chain() {
        // 3 channels in, selector keeps 2, LMS consumes them
        let mut p = pipeline_with(&[
            ("channelSelector", json!({"count": 2})),
            ("lmsFilter", json!({"numTaps": 4})),
        ]);
        let mut block = vec![0.1; 12]; // 4 frames x 3 channels
        let frames = p
            .process(&mut block, TimeBase::SampleRate(100.0), &ProcessOptions::new(3))
            .unwrap();
        assert_eq!(frames, 4);
        assert_eq!(block.len(), 8); // narrowed to 2 channels
    }

    #[test]
    fn test_synthesized_clock_continues() {
        let mut p = pipeline_with(&[(
            "movingAverage",
            json!({"mode": "moving", "windowDuration": 2.5}),
        )]);
        // 1 kHz: 1 ms per frame; the second call's window must look back
        // into the first call's samples
        let mut a = vec![1.0, 2.0, 3.0];
        p.process(&mut a, TimeBase::SampleRate(1000.0), &ProcessOptions::new(1))
            .unwrap();
        let mut b = vec![4.0];
        p.process(&mut b, TimeBase::SampleRate(1000.0), &ProcessOptions::new(1))
            .unwrap();
        assert!((b[0] - 3.0).abs() < 1e-6); // mean of 2, 3, 4
    }

    #[test]
    fn test_process_copy_leaves_input() {
        let mut p = pipeline_with(&[("rectify", json!({"mode": "full"}))]);
        let input = vec![-1.0, -2.0];
        let output = p
            .process_copy(&input, TimeBase::SampleRate(100.0), &ProcessOptions::new(1))
            .unwrap();
        assert_eq!(input, vec![-1.0, -2.0]);
        assert_eq!(output, vec![1.0, 2.0]);
    }

    #[test]
    fn test_list_state_summary() {
        let mut p = pipeline_with(&[
            ("movingAverage", json!({"mode": "moving", "windowSize": 3})),
            ("decimator", json!({"factor": 2})),
        ]);
        p.set_channels(1);
        let summary = p.list_state();
        assert_eq!(summary.stage_count, 2);
        assert_eq!(summary.stages[0].stage_type, "movingAverage");
        assert!(!summary.stages[0].resizing);
        assert!(summary.stages[1].resizing);
        assert_eq!(summary.stages[1].time_scale, 2.0);
        assert_eq!(summary.channels, Some(1));
    }

    #[test]
    fn test_load_rejects_different_stage_count() {
        let mut a = pipeline_with(&[("movingAverage", json!({"mode": "moving", "windowSize": 3}))]);
        let state = a.save_state().unwrap();

        let mut b = pipeline_with(&[
            ("movingAverage", json!({"mode": "moving", "windowSize": 3})),
            ("rectify", json!({"mode": "full"})),
        ]);
        assert!(matches!(
            b.load_state(&state),
            Err(SfError::StateFormatMismatch { .. })
        ));
    }

    #[test]
    fn test_load_rejects_different_critical_parameter() {
        let mut a = pipeline_with(&[("movingAverage", json!({"mode": "moving", "windowSize": 3}))]);
        let mut block = vec![1.0, 2.0];
        a.process(&mut block, TimeBase::SampleRate(100.0), &ProcessOptions::new(1))
            .unwrap();
        let state = a.save_state().unwrap();

        let mut b = pipeline_with(&[("movingAverage", json!({"mode": "moving", "windowSize": 5}))]);
        assert!(b.load_state(&state).is_err());

        // The rejected target keeps behaving like a fresh pipeline
        let mut block = vec![10.0];
        b.process(&mut block, TimeBase::SampleRate(100.0), &ProcessOptions::new(1))
            .unwrap();
        assert_eq!(block, vec![10.0]);
    }

    #[test]
    fn test_clear_state_resets_stream() {
        let mut p = pipeline_with(&[("movingAverage", json!({"mode": "moving", "windowSize": 2}))]);
        let mut block = vec![1.0, 3.0];
        p.process(&mut block, TimeBase::SampleRate(100.0), &ProcessOptions::new(1))
            .unwrap();
        p.clear_state();
        let mut block = vec![5.0];
        p.process(&mut block, TimeBase::SampleRate(100.0), &ProcessOptions::new(1))
            .unwrap();
        assert_eq!(block, vec![5.0]); // window restarted
    }
}
