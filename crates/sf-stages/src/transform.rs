//! Pre-trained matrix transform stages
//!
//! PCA, ICA, whitening and CSP application share one per-frame kernel:
//! `y = W * (x - mean)` where W is (components x channels). The frame count
//! is unchanged; the channel dimension narrows from `channels` to
//! `components`, so the stage goes through the resizing dispatch path and
//! emits a fresh interleaved buffer.

use serde_json::{json, Value};

use sf_core::{Sample, SfError, SfResult};
use sf_dsp::{MatrixLayout, MatrixView};

use crate::params::{opt_str, req_sample_array, req_usize};
use crate::{Stage, StageDescriptor};

/// Which decomposition produced the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Pca,
    Ica,
    Whitening,
    Csp,
}

impl TransformKind {
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Pca => "pca",
            Self::Ica => "ica",
            Self::Whitening => "whitening",
            Self::Csp => "csp",
        }
    }

    /// PCA and CSP reduce dimensionality; the others may keep it
    fn requires_reduction(self) -> bool {
        matches!(self, Self::Pca | Self::Csp)
    }
}

/// Spatial projection stage
pub struct MatrixTransformStage {
    kind: TransformKind,
    channels: usize,
    components: usize,
    matrix: Vec<Sample>,
    mean: Vec<Sample>,
    layout: MatrixLayout,
}

impl MatrixTransformStage {
    pub fn from_params(kind: TransformKind, params: &Value) -> SfResult<Self> {
        let channels = req_usize(params, "numChannels")?;
        let components = req_usize(params, "numComponents")?;
        if channels == 0 {
            return Err(SfError::invalid_param("numChannels", "must be positive"));
        }
        if components == 0 {
            return Err(SfError::invalid_param("numComponents", "must be positive"));
        }
        if kind.requires_reduction() && components > channels {
            return Err(SfError::invalid_param(
                "numComponents",
                format!(
                    "{} cannot emit more components than channels ({components} > {channels})",
                    kind.type_name()
                ),
            ));
        }
        let mean = req_sample_array(params, "mean")?;
        if mean.len() != channels {
            return Err(SfError::invalid_param(
                "mean",
                format!("expected {channels} entries, got {}", mean.len()),
            ));
        }
        let matrix = req_sample_array(params, "matrix")?;
        if matrix.len() != channels * components {
            return Err(SfError::invalid_param(
                "matrix",
                format!(
                    "expected {} entries for {components}x{channels}, got {}",
                    channels * components,
                    matrix.len()
                ),
            ));
        }
        let layout = match opt_str(params, "layout")?.unwrap_or("colMajor") {
            "colMajor" => MatrixLayout::ColMajor,
            "rowMajor" => MatrixLayout::RowMajor,
            other => {
                return Err(SfError::invalid_param(
                    "layout",
                    format!("expected colMajor or rowMajor, got `{other}`"),
                ));
            }
        };
        Ok(Self {
            kind,
            channels,
            components,
            matrix,
            mean,
            layout,
        })
    }
}

impl Stage for MatrixTransformStage {
    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(
            self.type_name(),
            json!({
                "numChannels": self.channels,
                "numComponents": self.components,
            }),
        )
    }

    /// Emits a fresh buffer even when components == channels
    fn is_resizing(&self) -> bool {
        true
    }

    fn output_channels(&self, _input_channels: usize) -> usize {
        self.components
    }

    fn required_channels(&self) -> Option<usize> {
        Some(self.channels)
    }

    fn process_resizing(
        &mut self,
        input: &[Sample],
        channels: usize,
        _timestamps: &[f32],
        output: &mut Vec<Sample>,
    ) -> SfResult<usize> {
        if channels != self.channels {
            return Err(SfError::ChannelMismatch {
                expected: self.channels,
                got: channels,
            });
        }
        let view = MatrixView::new(&self.matrix, self.components, self.channels, self.layout)?;
        let frames = input.len() / channels;
        let mut centered = vec![0.0; self.channels];
        let mut projected = vec![0.0; self.components];

        output.reserve(frames * self.components);
        for frame in input.chunks_exact(channels) {
            for (slot, (&x, &m)) in centered.iter_mut().zip(frame.iter().zip(&self.mean)) {
                *slot = x - m;
            }
            view.mat_vec(&centered, &mut projected);
            output.extend_from_slice(&projected);
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project(stage: &mut MatrixTransformStage, input: &[f32], channels: usize) -> Vec<f32> {
        let mut output = Vec::new();
        let frames = input.len() / channels;
        let ts: Vec<f32> = (0..frames).map(|i| i as f32).collect();
        stage
            .process_resizing(input, channels, &ts, &mut output)
            .unwrap();
        output
    }

    #[test]
    fn test_identity_projection() {
        // 2x2 identity, zero mean, column-major
        let mut s = MatrixTransformStage::from_params(
            TransformKind::Whitening,
            &json!({
                "numChannels": 2,
                "numComponents": 2,
                "matrix": [1.0, 0.0, 0.0, 1.0],
                "mean": [0.0, 0.0],
            }),
        )
        .unwrap();
        let out = project(&mut s, &[3.0, -1.0, 0.5, 2.0], 2);
        assert_eq!(out, vec![3.0, -1.0, 0.5, 2.0]);
    }

    #[test]
    fn test_mean_subtraction_and_narrowing() {
        // Project 3 channels to 1 component: y = sum(x - mean)
        let mut s = MatrixTransformStage::from_params(
            TransformKind::Pca,
            &json!({
                "numChannels": 3,
                "numComponents": 1,
                "matrix": [1.0, 1.0, 1.0],
                "mean": [1.0, 2.0, 3.0],
            }),
        )
        .unwrap();
        assert_eq!(s.output_channels(3), 1);
        let out = project(&mut s, &[2.0, 3.0, 4.0, 1.0, 2.0, 3.0], 3);
        // Frame count preserved, one channel per frame
        assert_eq!(out, vec![3.0, 0.0]);
    }

    #[test]
    fn test_column_major_ordering() {
        // W = [[1, 2], [3, 4]] stored column-major: [1, 3, 2, 4]
        let mut s = MatrixTransformStage::from_params(
            TransformKind::Ica,
            &json!({
                "numChannels": 2,
                "numComponents": 2,
                "matrix": [1.0, 3.0, 2.0, 4.0],
                "mean": [0.0, 0.0],
            }),
        )
        .unwrap();
        let out = project(&mut s, &[1.0, 1.0], 2);
        assert_eq!(out, vec![3.0, 7.0]);
    }

    #[test]
    fn test_row_major_layout_option() {
        let mut s = MatrixTransformStage::from_params(
            TransformKind::Ica,
            &json!({
                "numChannels": 2,
                "numComponents": 2,
                "matrix": [1.0, 2.0, 3.0, 4.0],
                "mean": [0.0, 0.0],
                "layout": "rowMajor",
            }),
        )
        .unwrap();
        let out = project(&mut s, &[1.0, 1.0], 2);
        assert_eq!(out, vec![3.0, 7.0]);
    }

    #[test]
    fn test_pca_rejects_expansion() {
        assert!(MatrixTransformStage::from_params(
            TransformKind::Pca,
            &json!({
                "numChannels": 2,
                "numComponents": 3,
                "matrix": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                "mean": [0.0, 0.0],
            }),
        )
        .is_err());
    }

    #[test]
    fn test_shape_validation() {
        assert!(MatrixTransformStage::from_params(
            TransformKind::Pca,
            &json!({
                "numChannels": 2,
                "numComponents": 1,
                "matrix": [1.0, 2.0, 3.0],
                "mean": [0.0, 0.0],
            }),
        )
        .is_err());
    }

    #[test]
    fn test_channel_mismatch_at_runtime() {
        let mut s = MatrixTransformStage::from_params(
            TransformKind::Pca,
            &json!({
                "numChannels": 2,
                "numComponents": 1,
                "matrix": [1.0, 0.0],
                "mean": [0.0, 0.0],
            }),
        )
        .unwrap();
        let mut output = Vec::new();
        assert!(s
            .process_resizing(&[1.0, 2.0, 3.0], 3, &[0.0], &mut output)
            .is_err());
    }
}
