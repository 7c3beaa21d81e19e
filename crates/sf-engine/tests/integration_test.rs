//! End-to-end pipeline scenarios
//!
//! Each test drives full pipelines through the public API: builder, block
//! processing, checkpointing and the observability surface.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use sf_dsp::FftContext;
use sf_engine::{PipelineBuilder, ProcessOptions, TimeBase};
use sf_event::{LogLevel, Observer, TopicFilter};

fn opts(channels: usize) -> ProcessOptions {
    ProcessOptions::new(channels)
}

/// S1: batch moving average replaces every sample with the block mean
#[test]
fn test_batch_moving_average() {
    let mut pipeline = PipelineBuilder::new("s1")
        .channels(1)
        .stage("movingAverage", json!({"mode": "batch"}))
        .build()
        .unwrap();

    let mut block = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    pipeline
        .process(&mut block, TimeBase::SampleRate(100.0), &opts(1))
        .unwrap();
    assert_eq!(block, vec![3.0, 3.0, 3.0, 3.0, 3.0]);
}

/// S2: moving average with window 3 streams across calls
#[test]
fn test_moving_average_streams() {
    let mut pipeline = PipelineBuilder::new("s2")
        .channels(1)
        .stage("movingAverage", json!({"mode": "moving", "windowSize": 3}))
        .build()
        .unwrap();

    let mut block = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    pipeline
        .process(&mut block, TimeBase::SampleRate(100.0), &opts(1))
        .unwrap();
    assert_eq!(block, vec![1.0, 1.5, 2.0, 3.0, 4.0]);

    let mut block = vec![6.0];
    pipeline
        .process(&mut block, TimeBase::SampleRate(100.0), &opts(1))
        .unwrap();
    assert_eq!(block, vec![5.0]); // mean of 4, 5, 6
}

/// S3: sliding regression slope locks onto a ramp
#[test]
fn test_linear_regression_slope() {
    let mut pipeline = PipelineBuilder::new("s3")
        .channels(1)
        .stage(
            "linearRegression",
            json!({"windowSize": 5, "output": "slope"}),
        )
        .build()
        .unwrap();

    let mut block: Vec<f32> = (0..10).map(|i| (i * 2) as f32).collect();
    pipeline
        .process(&mut block, TimeBase::SampleRate(100.0), &opts(1))
        .unwrap();
    for &slope in &block[5..] {
        assert!((slope - 2.0).abs() < 0.1, "slope {slope}");
    }
}

/// S4: the LMS canceler drives the error energy well under the primary's
#[test]
fn test_lms_convergence() {
    let mut pipeline = PipelineBuilder::new("s4")
        .channels(2)
        .stage("lmsFilter", json!({"numTaps": 32, "learningRate": 0.01}))
        .build()
        .unwrap();

    // Primary on channel 0; the reference on channel 1 is an unknown FIR
    // coloring of the primary that the filter must learn to reproduce
    let mut rng = StdRng::seed_from_u64(404);
    let primary: Vec<f32> = (0..1000).map(|_| rng.random_range(-1.0..1.0)).collect();
    let coloring = [0.6f64, -0.3, 0.15, 0.05];
    let reference: Vec<f32> = (0..primary.len())
        .map(|n| {
            let mut acc = 0.0;
            for (k, &h) in coloring.iter().enumerate() {
                if n >= k {
                    acc += h * primary[n - k] as f64;
                }
            }
            acc as f32
        })
        .collect();

    let mut block: Vec<f32> = primary
        .iter()
        .zip(&reference)
        .flat_map(|(&x, &d)| [x, d])
        .collect();
    pipeline
        .process(&mut block, TimeBase::SampleRate(1000.0), &opts(2))
        .unwrap();

    let errors: Vec<f32> = block.chunks_exact(2).map(|f| f[0]).collect();
    let tail_mse: f64 = errors[800..]
        .iter()
        .map(|&e| e as f64 * e as f64)
        .sum::<f64>()
        / 200.0;
    let primary_ms: f64 = primary[..200]
        .iter()
        .map(|&x| x as f64 * x as f64)
        .sum::<f64>()
        / 200.0;
    assert!(
        tail_mse < 0.1 * primary_ms,
        "tail MSE {tail_mse} vs primary {primary_ms}"
    );
}

/// S5: 160/147 rational resample (44.1 kHz -> 48 kHz) keeps a 1 kHz tone
#[test]
fn test_rational_resample_preserves_tone() {
    let mut pipeline = PipelineBuilder::new("s5")
        .channels(1)
        .stage("resampler", json!({"upFactor": 160, "downFactor": 147}))
        .build()
        .unwrap();

    let input_rate = 44100.0f32;
    let mut block: Vec<f32> = (0..14700)
        .map(|n| (2.0 * PI * 1000.0 * n as f32 / input_rate).sin())
        .collect();
    let frames = pipeline
        .process(&mut block, TimeBase::SampleRate(input_rate), &opts(1))
        .unwrap();
    assert_eq!(frames, 16000);

    // Spectrum of an interior slice at the new rate: the peak must sit at
    // 1 kHz within one bin
    let fft = FftContext::new();
    let spectrum = fft.spectrum(&block[4096..4096 + 8192]).unwrap();
    let peak_bin = spectrum
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .unwrap()
        .0;
    let expected_bin = 1000.0 * 8192.0 / 48000.0; // ~170.7
    assert!(
        (peak_bin as f32 - expected_bin).abs() <= 1.0,
        "peak at bin {peak_bin}, expected near {expected_bin}"
    );
}

/// S6: checkpoint round-trip resumes the stream identically
#[test]
fn test_checkpoint_roundtrip() {
    let build = || {
        PipelineBuilder::new("s6")
            .channels(1)
            .stage("movingAverage", json!({"mode": "moving", "windowSize": 3}))
            .build()
            .unwrap()
    };

    let mut original = build();
    let mut block = vec![1.0, 2.0, 3.0];
    original
        .process(&mut block, TimeBase::SampleRate(100.0), &opts(1))
        .unwrap();
    let checkpoint = original.save_state().unwrap();

    let mut restored = build();
    restored.load_state(&checkpoint).unwrap();

    let mut a = vec![4.0];
    original
        .process(&mut a, TimeBase::SampleRate(100.0), &opts(1))
        .unwrap();
    let mut b = vec![4.0];
    restored
        .process(&mut b, TimeBase::SampleRate(100.0), &opts(1))
        .unwrap();
    assert_eq!(a, vec![3.0]); // mean of 2, 3, 4
    assert_eq!(a, b);
}

/// S7: `*` matches exactly one dotted segment on the log surface
#[test]
fn test_topic_wildcard_filter() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&seen);

    let mut observer = Observer::new();
    observer.topic_filter = TopicFilter::new("pipeline.stage.*.error");
    observer.on_log = Some(Box::new(move |record| {
        sink.lock().unwrap().push(record.topic.clone());
    }));

    let mut pipeline = PipelineBuilder::new("s7")
        .channels(2)
        .stage("lmsFilter", json!({"numTaps": 4, "learningRate": 1.0}))
        .observer(observer)
        .build()
        .unwrap();

    // Absurd amplitudes force a divergence reset, which logs under
    // pipeline.stage.lmsFilter.error; performance records exist too but
    // must not pass the filter
    let mut block = vec![1e30f32; 64];
    pipeline
        .process(&mut block, TimeBase::SampleRate(100.0), &opts(2))
        .unwrap();

    let topics = seen.lock().unwrap();
    assert!(!topics.is_empty(), "divergence record should pass the filter");
    for topic in topics.iter() {
        assert_eq!(topic, "pipeline.stage.lmsFilter.error");
    }
}

/// Property 1: a non-resizing chain is invariant under block partitioning
#[test]
fn test_block_boundary_invariance_for_chain() {
    let build = || {
        PipelineBuilder::new("chain")
            .channels(1)
            .stage("rectify", json!({"mode": "full"}))
            .stage("convolution", json!({"kernel": [0.25, 0.5, 0.25]}))
            .stage("rms", json!({"mode": "moving", "windowSize": 4}))
            .build()
            .unwrap()
    };
    let input: Vec<f32> = (0..64).map(|i| ((i * 7 % 13) as f32 - 6.0) * 0.3).collect();

    let mut whole = build();
    let mut expected = input.clone();
    whole
        .process(&mut expected, TimeBase::SampleRate(1000.0), &opts(1))
        .unwrap();

    let mut split = build();
    let mut got = Vec::new();
    for chunk in [&input[..11], &input[11..40], &input[40..]] {
        let mut block = chunk.to_vec();
        split
            .process(&mut block, TimeBase::SampleRate(1000.0), &opts(1))
            .unwrap();
        got.extend(block);
    }
    assert_eq!(expected.len(), got.len());
    for (a, b) in expected.iter().zip(&got) {
        assert!((a - b).abs() < 1e-5, "{a} vs {b}");
    }
}

/// Property 2: resizing length law through the executor
#[test]
fn test_resizing_length_law() {
    let mut pipeline = PipelineBuilder::new("law")
        .channels(1)
        .stage("decimator", json!({"factor": 3}))
        .build()
        .unwrap();

    for n in [1usize, 2, 3, 7, 30, 31] {
        let mut block = vec![0.25; n];
        let frames = pipeline
            .process(&mut block, TimeBase::SampleRate(300.0), &opts(1))
            .unwrap();
        assert_eq!(block.len(), frames);
    }
}

/// Property 3: per-channel state never leaks across channels
#[test]
fn test_channel_independence() {
    let input_a: Vec<f32> = (0..40).map(|i| (i as f32 * 0.31).sin()).collect();
    let input_b: Vec<f32> = (0..40).map(|i| (i as f32 * 0.11).cos() * 2.0).collect();

    let build = |channels: usize| {
        PipelineBuilder::new("independence")
            .channels(channels)
            .stage("movingAverage", json!({"mode": "moving", "windowSize": 5}))
            .build()
            .unwrap()
    };

    // Stereo run
    let mut stereo = build(2);
    let mut interleaved: Vec<f32> = input_a
        .iter()
        .zip(&input_b)
        .flat_map(|(&a, &b)| [a, b])
        .collect();
    stereo
        .process(&mut interleaved, TimeBase::SampleRate(100.0), &opts(2))
        .unwrap();

    // Mono run on channel 0's data alone
    let mut solo = build(1);
    let mut channel0 = input_a.clone();
    solo.process(&mut channel0, TimeBase::SampleRate(100.0), &opts(1))
        .unwrap();

    for (frame, &expected) in interleaved.chunks_exact(2).zip(&channel0) {
        assert!((frame[0] - expected).abs() < 1e-6);
    }
}

/// Property 4: save/load round-trip over a stateful multi-stage pipeline
#[test]
fn test_deep_checkpoint_roundtrip() {
    let build = || {
        PipelineBuilder::new("deep")
            .channels(1)
            .stage("convolution", json!({"kernel": [0.5, 0.3, 0.2]}))
            .stage("differentiator", json!({}))
            .stage("rms", json!({"mode": "moving", "windowSize": 6}))
            .build()
            .unwrap()
    };
    let mut rng = StdRng::seed_from_u64(77);

    let mut original = build();
    let mut warmup: Vec<f32> = (0..50).map(|_| rng.random_range(-1.0..1.0)).collect();
    original
        .process(&mut warmup, TimeBase::SampleRate(500.0), &opts(1))
        .unwrap();
    let checkpoint = original.save_state().unwrap();

    let mut restored = build();
    restored.load_state(&checkpoint).unwrap();

    let future: Vec<f32> = (0..20).map(|_| rng.random_range(-1.0..1.0)).collect();
    let mut a = future.clone();
    original
        .process(&mut a, TimeBase::SampleRate(500.0), &opts(1))
        .unwrap();
    let mut b = future;
    restored
        .process(&mut b, TimeBase::SampleRate(500.0), &opts(1))
        .unwrap();
    assert_eq!(a, b);
}

/// Property 5: structural mismatch leaves the target untouched
#[test]
fn test_structural_mismatch_rejection() {
    let mut source = PipelineBuilder::new("src")
        .channels(1)
        .stage("movingAverage", json!({"mode": "moving", "windowSize": 3}))
        .build()
        .unwrap();
    let mut block = vec![1.0, 2.0];
    source
        .process(&mut block, TimeBase::SampleRate(100.0), &opts(1))
        .unwrap();
    let checkpoint = source.save_state().unwrap();

    // Different stage type entirely
    let mut target = PipelineBuilder::new("dst")
        .channels(1)
        .stage("rms", json!({"mode": "moving", "windowSize": 3}))
        .build()
        .unwrap();
    assert!(target.load_state(&checkpoint).is_err());

    // The target still behaves like a fresh pipeline
    let mut probe = vec![4.0];
    target
        .process(&mut probe, TimeBase::SampleRate(100.0), &opts(1))
        .unwrap();
    assert_eq!(probe, vec![4.0]);
}

/// Drift events surface through the observer with the gap localized
#[test]
fn test_drift_detection_end_to_end() {
    let drift_count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&drift_count);

    let mut observer = Observer::new();
    observer.on_drift = Some(Box::new(move |event| {
        assert!(event.relative_drift > 0.05);
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let mut pipeline = PipelineBuilder::new("drift")
        .channels(1)
        .stage("rectify", json!({"mode": "full"}))
        .observer(observer)
        .build()
        .unwrap();

    // 1 kHz nominal with a 3 ms stall in the middle
    let timestamps = [0.0f32, 1.0, 2.0, 5.0, 6.0, 7.0];
    let mut block = vec![0.5; 6];
    let options = ProcessOptions::new(1)
        .with_sample_rate(1000.0)
        .with_drift_detection(5.0);
    pipeline
        .process(&mut block, TimeBase::Timestamps(&timestamps), &options)
        .unwrap();
    assert_eq!(drift_count.load(Ordering::SeqCst), 1);
}

/// A panicking callback is contained and reported, not fatal
#[test]
fn test_callback_panic_is_contained() {
    let mut observer = Observer::new();
    observer.on_stage_complete = Some(Box::new(|_, _| panic!("sink exploded")));

    let mut pipeline = PipelineBuilder::new("panicky")
        .channels(1)
        .stage("rectify", json!({"mode": "full"}))
        .observer(observer)
        .build()
        .unwrap();

    let mut block = vec![-1.0, 2.0];
    let result = pipeline.process(&mut block, TimeBase::SampleRate(100.0), &opts(1));
    assert!(result.is_ok());
    assert_eq!(block, vec![1.0, 2.0]);

    // The pipeline keeps working on subsequent calls
    let mut block = vec![-3.0];
    assert!(pipeline
        .process(&mut block, TimeBase::SampleRate(100.0), &opts(1))
        .is_ok());
}

/// GSC front-end feeds a 2-channel adaptive canceler after narrowing
#[test]
fn test_gsc_selector_lms_chain() {
    let weights = sf_dsp::calculate_beamformer_weights(&[1.0, 1.0, 1.0, 1.0]).unwrap();
    let mut pipeline = PipelineBuilder::new("beam")
        .channels(4)
        .stage(
            "gscPreprocessor",
            json!({
                "numChannels": 4,
                "steeringWeights": weights.steering,
                "blockingMatrix": weights.blocking,
            }),
        )
        .stage("channelSelector", json!({"count": 2}))
        .stage("lmsFilter", json!({"numTaps": 8, "learningRate": 0.05}))
        .build()
        .unwrap();

    // Target common to all sensors plus per-sensor noise
    let mut rng = StdRng::seed_from_u64(99);
    let frames = 256;
    let mut block = Vec::with_capacity(frames * 4);
    for n in 0..frames {
        let target = (2.0 * PI * 5.0 * n as f32 / 100.0).sin();
        for _ in 0..4 {
            block.push(target + rng.random_range(-0.2..0.2));
        }
    }
    let emitted = pipeline
        .process(&mut block, TimeBase::SampleRate(1000.0), &opts(4))
        .unwrap();
    assert_eq!(emitted, frames);
    assert_eq!(block.len(), frames * 2); // narrowed to the canceler pair
    assert!(block.iter().all(|v| v.is_finite()));
}

/// Batched log flush delivers records in emission order once per call
#[test]
fn test_log_batch_flush() {
    let batches = Arc::new(Mutex::new(Vec::<usize>::new()));
    let sink = Arc::clone(&batches);

    let mut observer = Observer::new();
    observer.topic_filter = TopicFilter::new("pipeline.stage.*.performance");
    observer.on_log_batch = Some(Box::new(move |records| {
        assert!(records
            .iter()
            .all(|r| r.level == LogLevel::Debug && r.topic.ends_with(".performance")));
        sink.lock().unwrap().push(records.len());
    }));

    let mut pipeline = PipelineBuilder::new("logs")
        .channels(1)
        .stage("rectify", json!({"mode": "full"}))
        .stage("movingAverage", json!({"mode": "moving", "windowSize": 2}))
        .observer(observer)
        .build()
        .unwrap();

    for _ in 0..3 {
        let mut block = vec![1.0, -1.0];
        pipeline
            .process(&mut block, TimeBase::SampleRate(100.0), &opts(1))
            .unwrap();
    }
    // One flush per call, two performance records each (one per stage)
    assert_eq!(*batches.lock().unwrap(), vec![2, 2, 2]);
}

/// Taps observe the block after their stage, in stage order
#[test]
fn test_tap_sees_post_stage_block() {
    let captured = Arc::new(Mutex::new(Vec::<f32>::new()));
    let sink = Arc::clone(&captured);

    let mut pipeline = PipelineBuilder::new("tapped")
        .channels(1)
        .stage("rectify", json!({"mode": "full"}))
        .tap(Box::new(move |stage, samples| {
            assert_eq!(stage, "rectify");
            sink.lock().unwrap().extend_from_slice(samples);
        }))
        .build()
        .unwrap();

    let mut block = vec![-2.0, 3.0];
    pipeline
        .process(&mut block, TimeBase::SampleRate(100.0), &opts(1))
        .unwrap();
    assert_eq!(*captured.lock().unwrap(), vec![2.0, 3.0]);
}

/// An FFT stage reshapes the stream and downstream summaries agree
#[test]
fn test_spectral_pipeline_summary() {
    let mut pipeline = PipelineBuilder::new("spectrum")
        .channels(1)
        .stage(
            "fft",
            json!({"size": 64, "type": "rfft", "output": "magnitude"}),
        )
        .build()
        .unwrap();

    let summary = pipeline.list_state();
    assert_eq!(summary.stage_count, 1);
    assert!(summary.stages[0].resizing);

    let mut block: Vec<f32> = (0..64)
        .map(|i| (2.0 * PI * 8.0 * i as f32 / 64.0).sin())
        .collect();
    let frames = pipeline
        .process(&mut block, TimeBase::SampleRate(1000.0), &opts(1))
        .unwrap();
    assert_eq!(frames, 33);
    let peak = block
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .unwrap()
        .0;
    assert_eq!(peak, 8);
}
