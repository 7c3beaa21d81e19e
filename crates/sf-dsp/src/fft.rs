//! Shared FFT context
//!
//! One `FftContext` is created per process (or per pipeline group) and passed
//! by shared reference to every pipeline. Plans are cached per size behind a
//! lock; transforms themselves run lock-free on caller-provided buffers.
//!
//! Real transforms emit `size/2 + 1` half-spectrum bins. Inverse transforms
//! are normalized here so callers get time-domain samples back at unit gain.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use sf_core::{Sample, SfError, SfResult};

/// Spectrum output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectrumFormat {
    /// Interleaved re/im pairs
    Complex,
    /// Bin magnitudes
    Magnitude,
    /// Squared magnitudes
    Power,
    /// Bin phases (radians)
    Phase,
}

/// Shared FFT plan cache
///
/// `rustfft`/`realfft` planners already reuse twiddle tables internally; the
/// maps below pin the `Arc` plans so repeat lookups skip the planner lock
/// churn entirely.
pub struct FftContext {
    real_planner: Mutex<RealFftPlanner<Sample>>,
    complex_planner: Mutex<FftPlanner<Sample>>,
    real_forward: Mutex<HashMap<usize, Arc<dyn RealToComplex<Sample>>>>,
    real_inverse: Mutex<HashMap<usize, Arc<dyn ComplexToReal<Sample>>>>,
    complex_forward: Mutex<HashMap<usize, Arc<dyn Fft<Sample>>>>,
    complex_inverse: Mutex<HashMap<usize, Arc<dyn Fft<Sample>>>>,
}

impl Default for FftContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FftContext {
    pub fn new() -> Self {
        Self {
            real_planner: Mutex::new(RealFftPlanner::new()),
            complex_planner: Mutex::new(FftPlanner::new()),
            real_forward: Mutex::new(HashMap::new()),
            real_inverse: Mutex::new(HashMap::new()),
            complex_forward: Mutex::new(HashMap::new()),
            complex_inverse: Mutex::new(HashMap::new()),
        }
    }

    /// Forward real plan for `size` points
    pub fn plan_real_forward(&self, size: usize) -> Arc<dyn RealToComplex<Sample>> {
        let mut cache = self.real_forward.lock();
        cache
            .entry(size)
            .or_insert_with(|| self.real_planner.lock().plan_fft_forward(size))
            .clone()
    }

    /// Inverse real plan for `size` points
    pub fn plan_real_inverse(&self, size: usize) -> Arc<dyn ComplexToReal<Sample>> {
        let mut cache = self.real_inverse.lock();
        cache
            .entry(size)
            .or_insert_with(|| self.real_planner.lock().plan_fft_inverse(size))
            .clone()
    }

    fn plan_complex(&self, size: usize, forward: bool) -> Arc<dyn Fft<Sample>> {
        let cache = if forward {
            &self.complex_forward
        } else {
            &self.complex_inverse
        };
        let mut cache = cache.lock();
        cache
            .entry(size)
            .or_insert_with(|| {
                let mut planner = self.complex_planner.lock();
                if forward {
                    planner.plan_fft_forward(size)
                } else {
                    planner.plan_fft_inverse(size)
                }
            })
            .clone()
    }

    /// Real forward transform: `input.len()` points to `len/2 + 1` bins
    ///
    /// Works for arbitrary sizes; power-of-2 enforcement for the radix-2
    /// stage types happens at stage construction.
    pub fn rfft(&self, input: &[Sample]) -> SfResult<Vec<Complex<Sample>>> {
        let size = input.len();
        if size == 0 {
            return Err(SfError::KernelFailure("rfft of empty input".into()));
        }
        let plan = self.plan_real_forward(size);
        let mut scratch = input.to_vec();
        let mut spectrum = vec![Complex::new(0.0, 0.0); size / 2 + 1];
        plan.process(&mut scratch, &mut spectrum)
            .map_err(|e| SfError::KernelFailure(format!("rfft({size}): {e}")))?;
        Ok(spectrum)
    }

    /// Inverse real transform back to `size` time samples (unit gain)
    pub fn irfft(&self, spectrum: &[Complex<Sample>], size: usize) -> SfResult<Vec<Sample>> {
        if spectrum.len() != size / 2 + 1 {
            return Err(SfError::KernelFailure(format!(
                "irfft: expected {} bins for size {size}, got {}",
                size / 2 + 1,
                spectrum.len()
            )));
        }
        let plan = self.plan_real_inverse(size);
        let mut scratch = spectrum.to_vec();
        let mut output = vec![0.0; size];
        plan.process(&mut scratch, &mut output)
            .map_err(|e| SfError::KernelFailure(format!("irfft({size}): {e}")))?;
        let norm = 1.0 / size as Sample;
        for sample in &mut output {
            *sample *= norm;
        }
        Ok(output)
    }

    /// Complex transform in place; inverse is normalized by 1/n
    pub fn fft_complex(&self, data: &mut [Complex<Sample>], forward: bool) -> SfResult<()> {
        let size = data.len();
        if size == 0 {
            return Err(SfError::KernelFailure("fft of empty input".into()));
        }
        let plan = self.plan_complex(size, forward);
        plan.process(data);
        if !forward {
            let norm = 1.0 / size as Sample;
            for bin in data.iter_mut() {
                *bin *= norm;
            }
        }
        Ok(())
    }

    /// Hann-windowed magnitude spectrum of an arbitrary slice
    ///
    /// Convenience for analysis and tests; `len/2 + 1` bins.
    pub fn spectrum(&self, input: &[Sample]) -> SfResult<Vec<Sample>> {
        let window = crate::window::WindowKind::Hann.coefficients(input.len());
        let windowed: Vec<Sample> = input.iter().zip(&window).map(|(x, w)| x * w).collect();
        let bins = self.rfft(&windowed)?;
        Ok(bins.iter().map(|c| c.norm()).collect())
    }
}

/// Render a half spectrum into the requested output format
///
/// `Complex` interleaves re/im (2 floats per bin); the scalar formats emit
/// one float per bin.
pub fn render_spectrum(bins: &[Complex<Sample>], format: SpectrumFormat, out: &mut Vec<Sample>) {
    out.clear();
    match format {
        SpectrumFormat::Complex => {
            out.reserve(bins.len() * 2);
            for bin in bins {
                out.push(bin.re);
                out.push(bin.im);
            }
        }
        SpectrumFormat::Magnitude => out.extend(bins.iter().map(|c| c.norm())),
        SpectrumFormat::Power => out.extend(bins.iter().map(|c| c.norm_sqr())),
        SpectrumFormat::Phase => out.extend(bins.iter().map(|c| c.arg())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfft_bin_count() {
        let ctx = FftContext::new();
        let spectrum = ctx.rfft(&vec![0.0; 64]).unwrap();
        assert_eq!(spectrum.len(), 33);
    }

    #[test]
    fn test_rfft_dc() {
        let ctx = FftContext::new();
        let spectrum = ctx.rfft(&vec![1.0; 16]).unwrap();
        assert!((spectrum[0].re - 16.0).abs() < 1e-4);
        for bin in &spectrum[1..] {
            assert!(bin.norm() < 1e-4);
        }
    }

    #[test]
    fn test_rfft_irfft_roundtrip() {
        let ctx = FftContext::new();
        let input: Vec<f32> = (0..128).map(|i| (i as f32 * 0.37).sin()).collect();
        let spectrum = ctx.rfft(&input).unwrap();
        let back = ctx.irfft(&spectrum, 128).unwrap();
        for (a, b) in input.iter().zip(&back) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_complex_fft_single_tone() {
        let ctx = FftContext::new();
        let n = 32;
        // One full cycle across the buffer lands in bin 1
        let mut data: Vec<Complex<f32>> = (0..n)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
                Complex::new(phase.cos(), 0.0)
            })
            .collect();
        ctx.fft_complex(&mut data, true).unwrap();
        assert!((data[1].norm() - n as f32 / 2.0).abs() < 1e-3);
        assert!(data[2].norm() < 1e-3);
    }

    #[test]
    fn test_arbitrary_size_dft() {
        let ctx = FftContext::new();
        // Non-power-of-2 goes through the mixed-radix path
        let spectrum = ctx.rfft(&vec![1.0; 12]).unwrap();
        assert_eq!(spectrum.len(), 7);
        assert!((spectrum[0].re - 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_render_complex_interleaves() {
        let bins = vec![Complex::new(1.0, 2.0), Complex::new(3.0, 4.0)];
        let mut out = Vec::new();
        render_spectrum(&bins, SpectrumFormat::Complex, &mut out);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
        render_spectrum(&bins, SpectrumFormat::Power, &mut out);
        assert_eq!(out, vec![5.0, 25.0]);
    }
}
