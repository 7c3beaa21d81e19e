//! Detrending
//!
//! Removes the constant or least-squares linear component of a sequence.
//! Used ahead of correlation/spectral analysis so low-frequency drift does
//! not swamp the result.

use sf_core::Sample;

/// Detrend mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetrendMode {
    /// Subtract the mean
    Constant,
    /// Subtract the least-squares line
    Linear,
}

/// Detrend `data` in place
pub fn detrend(data: &mut [Sample], mode: DetrendMode) {
    let n = data.len();
    if n == 0 {
        return;
    }

    match mode {
        DetrendMode::Constant => {
            let mean = data.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
            for x in data.iter_mut() {
                *x -= mean as Sample;
            }
        }
        DetrendMode::Linear => {
            if n < 2 {
                data[0] = 0.0;
                return;
            }
            // Closed-form least squares over the index axis
            let nf = n as f64;
            let sum_x = nf * (nf - 1.0) / 2.0;
            let sum_xx = (nf - 1.0) * nf * (2.0 * nf - 1.0) / 6.0;
            let mut sum_y = 0.0;
            let mut sum_xy = 0.0;
            for (i, &y) in data.iter().enumerate() {
                sum_y += y as f64;
                sum_xy += i as f64 * y as f64;
            }
            let denom = nf * sum_xx - sum_x * sum_x;
            let slope = if denom.abs() > f64::EPSILON {
                (nf * sum_xy - sum_x * sum_y) / denom
            } else {
                0.0
            };
            let intercept = (sum_y - slope * sum_x) / nf;
            for (i, x) in data.iter_mut().enumerate() {
                *x -= (intercept + slope * i as f64) as Sample;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_removes_mean() {
        let mut data = vec![1.0, 2.0, 3.0, 4.0];
        detrend(&mut data, DetrendMode::Constant);
        let mean: f32 = data.iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);
    }

    #[test]
    fn test_linear_flattens_ramp() {
        let mut data: Vec<f32> = (0..50).map(|i| 3.0 + 0.5 * i as f32).collect();
        detrend(&mut data, DetrendMode::Linear);
        for x in &data {
            assert!(x.abs() < 1e-3, "residual {x}");
        }
    }

    #[test]
    fn test_linear_preserves_sinusoid_shape() {
        let mut data: Vec<f32> = (0..64)
            .map(|i| (i as f32 * 0.7).sin() + 0.1 * i as f32)
            .collect();
        let original: Vec<f32> = data.clone();
        detrend(&mut data, DetrendMode::Linear);
        // The ramp is gone but the oscillation survives
        let power: f32 = data.iter().map(|x| x * x).sum();
        assert!(power > 1.0);
        assert!(power < original.iter().map(|x| x * x).sum());
    }
}
