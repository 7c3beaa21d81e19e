//! Mel filterbank and MFCC kernels
//!
//! The filterbank matrix is supplied by the caller (it is designed outside
//! the engine); this module only performs the numerical operations: the
//! filterbank multiply over a power spectrum, the DCT-II cepstral projection
//! with optional sinusoidal liftering, and the Hz<->Mel scale conversions.

use std::f64::consts::PI;

use sf_core::{Sample, SfResult};

use crate::linalg::MatrixView;

/// Hz to Mel (O'Shaughnessy)
#[inline]
pub fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Mel to Hz
#[inline]
pub fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0f64.powf(mel / 2595.0) - 1.0)
}

/// Apply a Mel filterbank to a power spectrum
///
/// `filterbank` has one row per Mel band and one column per spectrum bin.
/// Returns the per-band energies.
pub fn mel_apply(filterbank: &MatrixView<'_>, power_spectrum: &[Sample]) -> SfResult<Vec<Sample>> {
    let mut out = vec![0.0; filterbank.rows()];
    filterbank.mat_vec(power_spectrum, &mut out);
    Ok(out)
}

/// DCT-II of log-Mel energies with optional liftering
///
/// Orthonormal DCT-II. When `lifter` is `Some(l)` with l > 0, coefficient k
/// is scaled by `1 + (l/2) * sin(pi * k / l)`.
pub fn mfcc_dct(log_mel: &[Sample], num_coeffs: usize, lifter: Option<f64>) -> Vec<Sample> {
    let n = log_mel.len();
    if n == 0 || num_coeffs == 0 {
        return Vec::new();
    }
    let num_coeffs = num_coeffs.min(n);
    let mut coeffs = Vec::with_capacity(num_coeffs);
    let scale0 = (1.0 / n as f64).sqrt();
    let scale = (2.0 / n as f64).sqrt();

    for k in 0..num_coeffs {
        let mut acc = 0.0f64;
        for (i, &x) in log_mel.iter().enumerate() {
            acc += x as f64 * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n as f64)).cos();
        }
        let mut c = acc * if k == 0 { scale0 } else { scale };
        if let Some(l) = lifter {
            if l > 0.0 {
                c *= 1.0 + (l / 2.0) * (PI * k as f64 / l).sin();
            }
        }
        coeffs.push(c as Sample);
    }
    coeffs
}
