//! Auto/cross-correlation via FFT
//!
//! Linear (not circular) correlation computed in the frequency domain with
//! zero padding to the next power of two, so large inputs stay O(n log n).

use rustfft::num_complex::Complex;

use sf_core::{Sample, SfResult};

use crate::fft::FftContext;

fn next_pow2(n: usize) -> usize {
    n.next_power_of_two()
}

/// Cross-correlation of `x` against `y`
///
/// Returns `x.len() + y.len() - 1` values; zero lag sits at index
/// `y.len() - 1`. `r[y.len() - 1 + k] = sum_i x[i + k] * y[i]`.
pub fn cross_correlate(ctx: &FftContext, x: &[Sample], y: &[Sample]) -> SfResult<Vec<Sample>> {
    if x.is_empty() || y.is_empty() {
        return Ok(Vec::new());
    }
    let full = x.len() + y.len() - 1;
    let size = next_pow2(full);

    let mut xp = vec![0.0; size];
    xp[..x.len()].copy_from_slice(x);
    let mut yp = vec![0.0; size];
    yp[..y.len()].copy_from_slice(y);

    let xs = ctx.rfft(&xp)?;
    let ys = ctx.rfft(&yp)?;

    // Correlation is convolution against the conjugate spectrum
    let product: Vec<Complex<Sample>> = xs.iter().zip(&ys).map(|(a, b)| a * b.conj()).collect();
    let time = ctx.irfft(&product, size)?;

    // Negative lags wrap to the tail of the inverse transform
    let mut result = Vec::with_capacity(full);
    for k in 0..full {
        let lag = k as isize - (y.len() as isize - 1);
        let idx = if lag < 0 {
            size - lag.unsigned_abs()
        } else {
            lag as usize
        };
        result.push(time[idx]);
    }
    Ok(result)
}

/// Autocorrelation for non-negative lags `0..=max_lag`
pub fn autocorrelate(ctx: &FftContext, x: &[Sample], max_lag: usize) -> SfResult<Vec<Sample>> {
    if x.is_empty() {
        return Ok(Vec::new());
    }
    let max_lag = max_lag.min(x.len() - 1);
    let size = next_pow2(x.len() * 2);

    let mut xp = vec![0.0; size];
    xp[..x.len()].copy_from_slice(x);
    let xs = ctx.rfft(&xp)?;

    let power: Vec<Complex<Sample>> = xs
        .iter()
        .map(|c| Complex::new(c.norm_sqr(), 0.0))
        .collect();
    let time = ctx.irfft(&power, size)?;
    Ok(time[..=max_lag].to_vec())
}
