//! sf-dsp: Numeric kernels for StreamForge
//!
//! The pure-compute substrate the stage library is built on:
//! - `fft` - Shared FFT context (real/complex transforms, plan caching)
//! - `window` - Analysis windows (Hann, Hamming, Blackman, Bartlett)
//! - `detrend` - Constant / linear least-squares detrending
//! - `correlate` - Auto/cross-correlation via FFT
//! - `mel` - Mel filterbank multiply, MFCC DCT-II with liftering
//! - `linalg` - Strided matrix views, dot/sum helpers
//! - `decompose` - Offline PCA / whitening / FastICA / CSP / beamformer fits
//!
//! Everything here is stateless apart from the FFT plan cache, which is
//! safe for concurrent readers.

pub mod correlate;
pub mod decompose;
pub mod detrend;
pub mod fft;
pub mod linalg;
pub mod mel;
pub mod window;

pub use correlate::{autocorrelate, cross_correlate};
pub use decompose::{
    calculate_beamformer_weights, calculate_csp, calculate_ica, calculate_pca,
    calculate_whitening, BeamformerWeights, SpatialModel,
};
pub use detrend::{detrend, DetrendMode};
pub use fft::FftContext;
pub use linalg::{dot, sum, sum_squares, MatrixLayout, MatrixView};
pub use mel::{hz_to_mel, mel_apply, mel_to_hz, mfcc_dct};
pub use window::WindowKind;
