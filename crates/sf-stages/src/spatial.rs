//! Spatial front-end and channel-geometry stages
//!
//! - `gscPreprocessor`: generalized sidelobe canceler front-end. Emits the
//!   blocked noise reference on channel 0 and the steered target on
//!   channel 1, zeroing the rest. The geometry is preserved (masking); a
//!   following `channelSelector` narrows to the two live channels for a
//!   2-channel adaptive canceler downstream.
//! - `channelSelector`: keeps the first K channels, dropping the rest
//! - `channelSelect`: projects an ordered index list (may reorder or
//!   duplicate)
//! - `channelMerge`: per-output-position source mapping
//!
//! The routing stages change the channel dimension, not the frame count,
//! and go through the resizing dispatch path.

use serde_json::{json, Value};

use sf_core::{Sample, SfError, SfResult};

use crate::params::{req_sample_array, req_usize, req_usize_array};
use crate::{Stage, StageDescriptor};

// ============ GSC Preprocessor ============

/// GSC beamforming front-end
pub struct GscPreprocessor {
    channels: usize,
    steering: Vec<Sample>,
    /// Column-major channels x (channels - 1)
    blocking: Vec<Sample>,
    scratch: Vec<Sample>,
}

impl GscPreprocessor {
    pub fn from_params(params: &Value) -> SfResult<Self> {
        let channels = req_usize(params, "numChannels")?;
        if channels < 2 {
            return Err(SfError::invalid_param("numChannels", "must be >= 2"));
        }
        let steering = req_sample_array(params, "steeringWeights")?;
        if steering.len() != channels {
            return Err(SfError::invalid_param(
                "steeringWeights",
                format!("expected {channels} entries, got {}", steering.len()),
            ));
        }
        let norm: f64 = steering.iter().map(|&x| (x as f64) * (x as f64)).sum();
        if (norm.sqrt() - 1.0).abs() > 1e-3 {
            return Err(SfError::invalid_param(
                "steeringWeights",
                "steering vector must be unit norm",
            ));
        }
        let blocking = req_sample_array(params, "blockingMatrix")?;
        if blocking.len() != channels * (channels - 1) {
            return Err(SfError::invalid_param(
                "blockingMatrix",
                format!(
                    "expected {} entries for {channels}x{}, got {}",
                    channels * (channels - 1),
                    channels - 1,
                    blocking.len()
                ),
            ));
        }
        // Every column must block the steering direction
        for col in 0..channels - 1 {
            let column = &blocking[col * channels..(col + 1) * channels];
            let leak: f64 = column
                .iter()
                .zip(&steering)
                .map(|(&b, &s)| b as f64 * s as f64)
                .sum();
            if leak.abs() > 1e-3 {
                return Err(SfError::invalid_param(
                    "blockingMatrix",
                    format!("column {col} is not orthogonal to the steering vector"),
                ));
            }
        }
        Ok(Self {
            channels,
            steering,
            blocking,
            scratch: vec![0.0; channels],
        })
    }
}

impl Stage for GscPreprocessor {
    fn type_name(&self) -> &'static str {
        "gscPreprocessor"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(self.type_name(), json!({ "numChannels": self.channels }))
    }

    fn required_channels(&self) -> Option<usize> {
        Some(self.channels)
    }

    fn process(
        &mut self,
        block: &mut [Sample],
        channels: usize,
        _timestamps: &[f32],
    ) -> SfResult<()> {
        if channels != self.channels {
            return Err(SfError::ChannelMismatch {
                expected: self.channels,
                got: channels,
            });
        }
        let first_column = &self.blocking[..self.channels];
        for frame in block.chunks_exact_mut(channels) {
            self.scratch.copy_from_slice(frame);
            let mut reference = 0.0f64;
            let mut target = 0.0f64;
            for ((&x, &b), &s) in self
                .scratch
                .iter()
                .zip(first_column)
                .zip(&self.steering)
            {
                reference += x as f64 * b as f64;
                target += x as f64 * s as f64;
            }
            frame[0] = reference as Sample;
            frame[1] = target as Sample;
            for slot in frame.iter_mut().skip(2) {
                *slot = 0.0;
            }
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

// ============ Channel Geometry ============

/// How a channel-geometry stage routes inputs to outputs
enum Routing {
    KeepFirst(usize),
    Map(Vec<usize>),
}

/// Channel router behind the three wire types
pub struct ChannelRouteStage {
    name: &'static str,
    routing: Routing,
}

impl ChannelRouteStage {
    pub fn selector(params: &Value) -> SfResult<Self> {
        let count = req_usize(params, "count")?;
        if count == 0 {
            return Err(SfError::invalid_param("count", "must keep at least one channel"));
        }
        Ok(Self {
            name: "channelSelector",
            routing: Routing::KeepFirst(count),
        })
    }

    pub fn select(params: &Value) -> SfResult<Self> {
        let indices = req_usize_array(params, "indices")?;
        if indices.is_empty() {
            return Err(SfError::invalid_param("indices", "must be non-empty"));
        }
        Ok(Self {
            name: "channelSelect",
            routing: Routing::Map(indices),
        })
    }

    pub fn merge(params: &Value) -> SfResult<Self> {
        let mapping = req_usize_array(params, "mapping")?;
        if mapping.is_empty() {
            return Err(SfError::invalid_param("mapping", "must be non-empty"));
        }
        Ok(Self {
            name: "channelMerge",
            routing: Routing::Map(mapping),
        })
    }
}

impl Stage for ChannelRouteStage {
    fn type_name(&self) -> &'static str {
        self.name
    }

    fn descriptor(&self) -> StageDescriptor {
        let config = match &self.routing {
            Routing::KeepFirst(count) => json!({ "count": count }),
            Routing::Map(map) => json!({ "map": map }),
        };
        StageDescriptor::new(self.name, config)
    }

    /// Always emits a fresh buffer, even when the channel count happens to
    /// be unchanged (a pure reorder)
    fn is_resizing(&self) -> bool {
        true
    }

    fn output_channels(&self, input_channels: usize) -> usize {
        match &self.routing {
            Routing::KeepFirst(count) => (*count).min(input_channels),
            Routing::Map(map) => map.len(),
        }
    }

    fn process_resizing(
        &mut self,
        input: &[Sample],
        channels: usize,
        _timestamps: &[f32],
        output: &mut Vec<Sample>,
    ) -> SfResult<usize> {
        let frames = input.len() / channels;
        match &self.routing {
            Routing::KeepFirst(count) => {
                let keep = (*count).min(channels);
                output.reserve(frames * keep);
                for frame in input.chunks_exact(channels) {
                    output.extend_from_slice(&frame[..keep]);
                }
            }
            Routing::Map(map) => {
                if let Some(&bad) = map.iter().find(|&&src| src >= channels) {
                    return Err(SfError::ChannelMismatch {
                        expected: bad + 1,
                        got: channels,
                    });
                }
                output.reserve(frames * map.len());
                for frame in input.chunks_exact(channels) {
                    for &src in map {
                        output.push(frame[src]);
                    }
                }
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
