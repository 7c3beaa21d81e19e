//! Stage factory
//!
//! Maps wire type names to configured stages. The builder funnels every
//! `add_stage(type_name, params)` through here; unknown names and rejected
//! parameters surface as `InvalidParameter`.

use std::sync::Arc;

use serde_json::Value;

use sf_core::{SfError, SfResult};
use sf_dsp::FftContext;

use crate::adaptive::{LmsFilter, RlsFilter};
use crate::convolution::ConvolutionStage;
use crate::detect::{ClipDetectionStage, PeakDetectionStage, SnrStage};
use crate::features::{DiffFeatureKind, DiffFeatureStage, LinearRegressionStage};
use crate::resample::{ResampleKind, ResampleStage};
use crate::shaping::{DifferentiatorStage, IntegratorStage, RectifyStage};
use crate::spatial::{ChannelRouteStage, GscPreprocessor};
use crate::spectral::{FftStage, HilbertEnvelopeStage, StftStage};
use crate::stats::{StatisticKind, StatisticStage};
use crate::transform::{MatrixTransformStage, TransformKind};
use crate::wavelet::WaveletStage;
use crate::BoxedStage;

/// All wire type names the factory accepts
pub const STAGE_TYPES: &[&str] = &[
    "movingAverage",
    "rms",
    "variance",
    "mav",
    "zScore",
    "rectify",
    "waveformLength",
    "ssc",
    "wamp",
    "linearRegression",
    "lmsFilter",
    "rlsFilter",
    "convolution",
    "interpolator",
    "decimator",
    "resampler",
    "fft",
    "stft",
    "wavelet",
    "hilbertEnvelope",
    "pca",
    "ica",
    "whitening",
    "csp",
    "gscPreprocessor",
    "channelSelector",
    "channelSelect",
    "channelMerge",
    "clipDetection",
    "peakDetection",
    "differentiator",
    "integrator",
    "snr",
];

/// Construct a configured stage from its wire name and parameter record
pub fn create_stage(
    type_name: &str,
    params: &Value,
    fft: &Arc<FftContext>,
) -> SfResult<BoxedStage> {
    let stage: BoxedStage = match type_name {
        "movingAverage" => Box::new(StatisticStage::from_params(StatisticKind::Mean, params)?),
        "rms" => Box::new(StatisticStage::from_params(StatisticKind::Rms, params)?),
        "variance" => Box::new(StatisticStage::from_params(StatisticKind::Variance, params)?),
        "mav" => Box::new(StatisticStage::from_params(StatisticKind::MeanAbs, params)?),
        "zScore" => Box::new(StatisticStage::from_params(StatisticKind::ZScore, params)?),
        "rectify" => Box::new(RectifyStage::from_params(params)?),
        "waveformLength" => Box::new(DiffFeatureStage::from_params(
            DiffFeatureKind::WaveformLength,
            params,
        )?),
        "ssc" => Box::new(DiffFeatureStage::from_params(
            DiffFeatureKind::SlopeSignChanges,
            params,
        )?),
        "wamp" => Box::new(DiffFeatureStage::from_params(
            DiffFeatureKind::WillisonAmplitude,
            params,
        )?),
        "linearRegression" => Box::new(LinearRegressionStage::from_params(params)?),
        "lmsFilter" => Box::new(LmsFilter::from_params(params)?),
        "rlsFilter" => Box::new(RlsFilter::from_params(params)?),
        "convolution" => Box::new(ConvolutionStage::from_params(params, Arc::clone(fft))?),
        "interpolator" => Box::new(ResampleStage::from_params(
            ResampleKind::Interpolate,
            params,
        )?),
        "decimator" => Box::new(ResampleStage::from_params(ResampleKind::Decimate, params)?),
        "resampler" => Box::new(ResampleStage::from_params(ResampleKind::Rational, params)?),
        "fft" => Box::new(FftStage::from_params(params, Arc::clone(fft))?),
        "stft" => Box::new(StftStage::from_params(params, Arc::clone(fft))?),
        "wavelet" => Box::new(WaveletStage::from_params(params)?),
        "hilbertEnvelope" => Box::new(HilbertEnvelopeStage::from_params(params, Arc::clone(fft))?),
        "pca" => Box::new(MatrixTransformStage::from_params(TransformKind::Pca, params)?),
        "ica" => Box::new(MatrixTransformStage::from_params(TransformKind::Ica, params)?),
        "whitening" => Box::new(MatrixTransformStage::from_params(
            TransformKind::Whitening,
            params,
        )?),
        "csp" => Box::new(MatrixTransformStage::from_params(TransformKind::Csp, params)?),
        "gscPreprocessor" => Box::new(GscPreprocessor::from_params(params)?),
        "channelSelector" => Box::new(ChannelRouteStage::selector(params)?),
        "channelSelect" => Box::new(ChannelRouteStage::select(params)?),
        "channelMerge" => Box::new(ChannelRouteStage::merge(params)?),
        "clipDetection" => Box::new(ClipDetectionStage::from_params(params)?),
        "peakDetection" => Box::new(PeakDetectionStage::from_params(params)?),
        "differentiator" => Box::new(DifferentiatorStage::from_params(params)?),
        "integrator" => Box::new(IntegratorStage::from_params(params)?),
        "snr" => Box::new(SnrStage::from_params(params)?),
        other => {
            return Err(SfError::invalid_param(
                "type",
                format!("unknown stage type `{other}`"),
            ));
        }
    };
    Ok(stage)
}
