//! Offline spatial decompositions
//!
//! Fits the matrices the matrix-transform stages apply at stream time:
//! - PCA (principal component analysis)
//! - Whitening (decorrelation + unit variance)
//! - FastICA (independent components, symmetric orthogonalization)
//! - CSP (common spatial patterns over two labeled classes)
//! - Delay-and-sum beamformer weights + blocking matrix for the GSC front-end
//!
//! All functions consume interleaved f32 frames and return freshly allocated
//! results. Internals run in f64; the symmetric eigen solver is cyclic
//! Jacobi, which is exact enough at the channel counts involved (<= dozens).

use serde::{Deserialize, Serialize};

use sf_core::{Sample, SfError, SfResult};

// ============ Model Types ============

/// A fitted spatial transform: `y = matrix * (x - mean)`
///
/// `matrix` is row-major, `components` rows by `channels` columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialModel {
    pub matrix: Vec<Sample>,
    pub mean: Vec<Sample>,
    pub components: usize,
    pub channels: usize,
}

/// GSC front-end weights: unit steering vector plus a blocking matrix whose
/// columns are orthogonal to it (column-major, `channels x (channels - 1)`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamformerWeights {
    pub steering: Vec<Sample>,
    pub blocking: Vec<Sample>,
    pub channels: usize,
}

// ============ f64 Matrix Helpers ============

#[inline]
fn idx(row: usize, col: usize, n: usize) -> usize {
    row * n + col
}

/// `a (p x q) * b (q x r)`, all row-major
fn mat_mul(a: &[f64], b: &[f64], p: usize, q: usize, r: usize) -> Vec<f64> {
    let mut out = vec![0.0; p * r];
    for i in 0..p {
        for k in 0..q {
            let aik = a[i * q + k];
            if aik == 0.0 {
                continue;
            }
            for j in 0..r {
                out[i * r + j] += aik * b[k * r + j];
            }
        }
    }
    out
}

/// Per-channel mean of interleaved frames
fn channel_means(data: &[Sample], channels: usize) -> Vec<f64> {
    let frames = data.len() / channels;
    let mut means = vec![0.0f64; channels];
    for frame in data.chunks_exact(channels) {
        for (m, &x) in means.iter_mut().zip(frame) {
            *m += x as f64;
        }
    }
    if frames > 0 {
        for m in &mut means {
            *m /= frames as f64;
        }
    }
    means
}

/// Mean-removed channel covariance (c x c row-major)
fn covariance(data: &[Sample], channels: usize) -> SfResult<(Vec<f64>, Vec<f64>)> {
    if channels == 0 || data.len() < channels * 2 {
        return Err(SfError::KernelFailure(
            "decomposition needs at least 2 frames".into(),
        ));
    }
    if data.len() % channels != 0 {
        return Err(SfError::KernelFailure(
            "interleaved data length is not a multiple of the channel count".into(),
        ));
    }
    let frames = data.len() / channels;
    let means = channel_means(data, channels);
    let mut cov = vec![0.0f64; channels * channels];
    let mut centered = vec![0.0f64; channels];
    for frame in data.chunks_exact(channels) {
        for (ch, &x) in frame.iter().enumerate() {
            centered[ch] = x as f64 - means[ch];
        }
        for i in 0..channels {
            for j in i..channels {
                cov[idx(i, j, channels)] += centered[i] * centered[j];
            }
        }
    }
    let norm = 1.0 / (frames as f64 - 1.0);
    for i in 0..channels {
        for j in i..channels {
            let v = cov[idx(i, j, channels)] * norm;
            cov[idx(i, j, channels)] = v;
            cov[idx(j, i, channels)] = v;
        }
    }
    Ok((cov, means))
}

// ============ Jacobi Eigen Solver ============

/// Cyclic Jacobi eigendecomposition of a symmetric matrix
///
/// Returns (eigenvalues, eigenvectors) sorted by descending eigenvalue;
/// eigenvector k is column k of the returned row-major matrix.
fn jacobi_eigen(matrix: &[f64], n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut a = matrix.to_vec();
    let mut v = vec![0.0f64; n * n];
    for i in 0..n {
        v[idx(i, i, n)] = 1.0;
    }

    const MAX_SWEEPS: usize = 64;
    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                off += a[idx(i, j, n)] * a[idx(i, j, n)];
            }
        }
        if off < 1e-22 {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[idx(p, q, n)];
                if apq.abs() < 1e-30 {
                    continue;
                }
                let app = a[idx(p, p, n)];
                let aqq = a[idx(q, q, n)];
                let theta = (aqq - app) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[idx(k, p, n)];
                    let akq = a[idx(k, q, n)];
                    a[idx(k, p, n)] = c * akp - s * akq;
                    a[idx(k, q, n)] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[idx(p, k, n)];
                    let aqk = a[idx(q, k, n)];
                    a[idx(p, k, n)] = c * apk - s * aqk;
                    a[idx(q, k, n)] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[idx(k, p, n)];
                    let vkq = v[idx(k, q, n)];
                    v[idx(k, p, n)] = c * vkp - s * vkq;
                    v[idx(k, q, n)] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        a[idx(j, j, n)]
            .partial_cmp(&a[idx(i, i, n)])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let eigenvalues: Vec<f64> = order.iter().map(|&k| a[idx(k, k, n)]).collect();
    let mut eigenvectors = vec![0.0f64; n * n];
    for (new_col, &old_col) in order.iter().enumerate() {
        for row in 0..n {
            eigenvectors[idx(row, new_col, n)] = v[idx(row, old_col, n)];
        }
    }
    (eigenvalues, eigenvectors)
}

/// Rows of `Ut` (k x n) from the top-k eigenvector columns
fn top_eigenvector_rows(eigenvectors: &[f64], n: usize, k: usize) -> Vec<f64> {
    let mut rows = vec![0.0f64; k * n];
    for comp in 0..k {
        for ch in 0..n {
            rows[comp * n + ch] = eigenvectors[idx(ch, comp, n)];
        }
    }
    rows
}

fn to_model(matrix: Vec<f64>, means: Vec<f64>, components: usize, channels: usize) -> SpatialModel {
    SpatialModel {
        matrix: matrix.into_iter().map(|x| x as Sample).collect(),
        mean: means.into_iter().map(|x| x as Sample).collect(),
        components,
        channels,
    }
}

fn check_components(components: usize, channels: usize) -> SfResult<()> {
    if components == 0 || components > channels {
        return Err(SfError::invalid_param(
            "numComponents",
            format!("must be in 1..={channels}"),
        ));
    }
    Ok(())
}

// ============ PCA / Whitening ============

/// Fit a PCA projection: rows are the top eigenvectors of the covariance
pub fn calculate_pca(
    data: &[Sample],
    channels: usize,
    components: usize,
) -> SfResult<SpatialModel> {
    check_components(components, channels)?;
    let (cov, means) = covariance(data, channels)?;
    let (_, vectors) = jacobi_eigen(&cov, channels);
    let matrix = top_eigenvector_rows(&vectors, channels, components);
    Ok(to_model(matrix, means, components, channels))
}

/// Fit a whitening transform: `diag(1/sqrt(lambda)) * Ut`
pub fn calculate_whitening(
    data: &[Sample],
    channels: usize,
    components: usize,
) -> SfResult<SpatialModel> {
    check_components(components, channels)?;
    let (cov, means) = covariance(data, channels)?;
    let (values, vectors) = jacobi_eigen(&cov, channels);
    let mut matrix = top_eigenvector_rows(&vectors, channels, components);
    for comp in 0..components {
        let scale = 1.0 / (values[comp].max(0.0) + 1e-12).sqrt();
        for ch in 0..channels {
            matrix[comp * channels + ch] *= scale;
        }
    }
    Ok(to_model(matrix, means, components, channels))
}

// ============ FastICA ============

/// Deterministic pseudo-random fill for the rotation seed
fn seeded_fill(buffer: &mut [f64]) {
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    for slot in buffer.iter_mut() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        *slot = ((state >> 33) as f64 / (1u64 << 31) as f64) - 1.0;
    }
}

/// Symmetric orthonormalization: `B <- (B Bt)^(-1/2) B`
fn sym_orthonormalize(b: &mut Vec<f64>, p: usize) {
    let bt: Vec<f64> = {
        let mut t = vec![0.0; p * p];
        for i in 0..p {
            for j in 0..p {
                t[idx(j, i, p)] = b[idx(i, j, p)];
            }
        }
        t
    };
    let bbt = mat_mul(b, &bt, p, p, p);
    let (values, vectors) = jacobi_eigen(&bbt, p);
    // (B Bt)^(-1/2) = U diag(1/sqrt(lambda)) Ut
    let mut scaled = vec![0.0; p * p];
    for col in 0..p {
        let scale = 1.0 / (values[col].max(1e-12)).sqrt();
        for row in 0..p {
            scaled[idx(row, col, p)] = vectors[idx(row, col, p)] * scale;
        }
    }
    let mut ut = vec![0.0; p * p];
    for i in 0..p {
        for j in 0..p {
            ut[idx(i, j, p)] = vectors[idx(j, i, p)];
        }
    }
    let inv_sqrt = mat_mul(&scaled, &ut, p, p, p);
    *b = mat_mul(&inv_sqrt, b, p, p, p);
}

/// Fit FastICA unmixing: whiten, then symmetric fixed-point iteration with
/// the tanh contrast
pub fn calculate_ica(
    data: &[Sample],
    channels: usize,
    components: usize,
) -> SfResult<SpatialModel> {
    const MAX_ITER: usize = 200;
    const TOL: f64 = 1e-6;

    check_components(components, channels)?;
    let white = calculate_whitening(data, channels, components)?;
    let frames = data.len() / channels;
    let p = components;

    // Whitened data, p x frames
    let mut xw = vec![0.0f64; p * frames];
    for (frame_idx, frame) in data.chunks_exact(channels).enumerate() {
        for comp in 0..p {
            let mut acc = 0.0f64;
            for ch in 0..channels {
                acc += white.matrix[comp * channels + ch] as f64
                    * (frame[ch] as f64 - white.mean[ch] as f64);
            }
            xw[comp * frames + frame_idx] = acc;
        }
    }

    let mut b = vec![0.0f64; p * p];
    seeded_fill(&mut b);
    sym_orthonormalize(&mut b, p);

    for _ in 0..MAX_ITER {
        let prev = b.clone();
        let mut b_new = vec![0.0f64; p * p];
        for comp in 0..p {
            let w = &prev[comp * p..(comp + 1) * p];
            let mut expect_xg = vec![0.0f64; p];
            let mut expect_gprime = 0.0f64;
            for t in 0..frames {
                let mut y = 0.0;
                for (j, &wj) in w.iter().enumerate() {
                    y += wj * xw[j * frames + t];
                }
                let g = y.tanh();
                expect_gprime += 1.0 - g * g;
                for (j, slot) in expect_xg.iter_mut().enumerate() {
                    *slot += xw[j * frames + t] * g;
                }
            }
            let nf = frames as f64;
            for j in 0..p {
                b_new[comp * p + j] = expect_xg[j] / nf - (expect_gprime / nf) * w[j];
            }
        }
        sym_orthonormalize(&mut b_new, p);

        // Convergence: rows aligned with previous iteration up to sign
        let mut max_dev = 0.0f64;
        for comp in 0..p {
            let mut align = 0.0;
            for j in 0..p {
                align += b_new[comp * p + j] * prev[comp * p + j];
            }
            max_dev = max_dev.max((align.abs() - 1.0).abs());
        }
        b = b_new;
        if max_dev < TOL {
            break;
        }
    }

    // Unmixing in sensor space: B * W_whiten
    let white_f64: Vec<f64> = white.matrix.iter().map(|&x| x as f64).collect();
    let matrix = mat_mul(&b, &white_f64, p, p, channels);
    let means = white.mean.iter().map(|&x| x as f64).collect();
    Ok(to_model(matrix, means, p, channels))
}

// ============ CSP ============

/// Fit common spatial patterns from two labeled classes
///
/// Filters are taken alternately from the two ends of the eigenvalue
/// spectrum of the whitened class-A covariance (max variance for A first,
/// then max for B, and so on).
pub fn calculate_csp(
    class_a: &[Sample],
    class_b: &[Sample],
    channels: usize,
    filters: usize,
) -> SfResult<SpatialModel> {
    check_components(filters, channels)?;
    let (mut cov_a, mean_a) = covariance(class_a, channels)?;
    let (mut cov_b, mean_b) = covariance(class_b, channels)?;

    // Trace-normalize so class balance does not skew the composite
    for cov in [&mut cov_a, &mut cov_b] {
        let trace: f64 = (0..channels).map(|i| cov[idx(i, i, channels)]).sum();
        if trace > 1e-12 {
            for value in cov.iter_mut() {
                *value /= trace;
            }
        }
    }

    let composite: Vec<f64> = cov_a.iter().zip(&cov_b).map(|(a, b)| a + b).collect();
    let (comp_values, comp_vectors) = jacobi_eigen(&composite, channels);

    // Whitening of the composite covariance
    let mut whiten = top_eigenvector_rows(&comp_vectors, channels, channels);
    for row in 0..channels {
        let scale = 1.0 / (comp_values[row].max(0.0) + 1e-12).sqrt();
        for ch in 0..channels {
            whiten[row * channels + ch] *= scale;
        }
    }

    // S_a = P R_a Pt; its eigenvectors sort classes to opposite ends
    let whiten_t: Vec<f64> = {
        let mut t = vec![0.0; channels * channels];
        for i in 0..channels {
            for j in 0..channels {
                t[idx(j, i, channels)] = whiten[idx(i, j, channels)];
            }
        }
        t
    };
    let sa = mat_mul(
        &mat_mul(&whiten, &cov_a, channels, channels, channels),
        &whiten_t,
        channels,
        channels,
        channels,
    );
    let (_, rot) = jacobi_eigen(&sa, channels);

    // Full filter bank: Ut * P, rows sorted by descending class-A variance
    let rot_rows = top_eigenvector_rows(&rot, channels, channels);
    let bank = mat_mul(&rot_rows, &whiten, channels, channels, channels);

    // Alternate extremes: 0, n-1, 1, n-2, ...
    let mut matrix = vec![0.0f64; filters * channels];
    for slot in 0..filters {
        let source = if slot % 2 == 0 {
            slot / 2
        } else {
            channels - 1 - slot / 2
        };
        matrix[slot * channels..(slot + 1) * channels]
            .copy_from_slice(&bank[source * channels..(source + 1) * channels]);
    }

    // Shared mean over both classes
    let means: Vec<f64> = mean_a.iter().zip(&mean_b).map(|(a, b)| (a + b) / 2.0).collect();
    Ok(to_model(matrix, means, filters, channels))
}

// ============ Beamformer ============

/// Normalize a steering vector and build its orthogonal blocking matrix
///
/// The blocking matrix has `channels - 1` columns (column-major), each unit
/// norm and orthogonal to the steering direction, built by Gram-Schmidt over
/// the standard basis.
pub fn calculate_beamformer_weights(steering: &[Sample]) -> SfResult<BeamformerWeights> {
    let n = steering.len();
    if n < 2 {
        return Err(SfError::invalid_param(
            "steeringWeights",
            "beamformer needs at least 2 channels",
        ));
    }
    let norm = (steering.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>()).sqrt();
    if norm < 1e-12 {
        return Err(SfError::invalid_param(
            "steeringWeights",
            "steering vector must be non-zero",
        ));
    }
    let s: Vec<f64> = steering.iter().map(|&x| x as f64 / norm).collect();

    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(n - 1);
    for basis in 0..n {
        if columns.len() == n - 1 {
            break;
        }
        let mut candidate = vec![0.0f64; n];
        candidate[basis] = 1.0;

        // Remove the steering component, then prior columns
        let proj: f64 = candidate.iter().zip(&s).map(|(c, s)| c * s).sum();
        for (c, sv) in candidate.iter_mut().zip(&s) {
            *c -= proj * sv;
        }
        for col in &columns {
            let proj: f64 = candidate.iter().zip(col).map(|(c, v)| c * v).sum();
            for (c, v) in candidate.iter_mut().zip(col) {
                *c -= proj * v;
            }
        }

        let len = candidate.iter().map(|c| c * c).sum::<f64>().sqrt();
        if len < 1e-9 {
            continue; // basis vector was parallel to the span so far
        }
        for c in &mut candidate {
            *c /= len;
        }
        columns.push(candidate);
    }

    if columns.len() != n - 1 {
        return Err(SfError::KernelFailure(
            "failed to span the blocking subspace".into(),
        ));
    }

    let mut blocking = Vec::with_capacity(n * (n - 1));
    for col in &columns {
        blocking.extend(col.iter().map(|&x| x as Sample));
    }
    Ok(BeamformerWeights {
        steering: s.into_iter().map(|x| x as Sample).collect(),
        blocking,
        channels: n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Interleave two channel signals
    fn interleave(a: &[f32], b: &[f32]) -> Vec<f32> {
        a.iter().zip(b).flat_map(|(&x, &y)| [x, y]).collect()
    }

    #[test]
    fn test_jacobi_diagonal_passthrough() {
        let m = [3.0, 0.0, 0.0, 1.0];
        let (values, vectors) = jacobi_eigen(&m, 2);
        assert!((values[0] - 3.0).abs() < 1e-10);
        assert!((values[1] - 1.0).abs() < 1e-10);
        assert!((vectors[idx(0, 0, 2)].abs() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_jacobi_known_eigenvalues() {
        // [[2, 1], [1, 2]] has eigenvalues 3 and 1
        let m = [2.0, 1.0, 1.0, 2.0];
        let (values, vectors) = jacobi_eigen(&m, 2);
        assert!((values[0] - 3.0).abs() < 1e-9);
        assert!((values[1] - 1.0).abs() < 1e-9);
        // Leading eigenvector is [1, 1]/sqrt(2) up to sign
        let ratio = vectors[idx(0, 0, 2)] / vectors[idx(1, 0, 2)];
        assert!((ratio - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pca_finds_dominant_direction() {
        // Channel 1 = 2 * channel 0 plus a whisper of noise
        let base: Vec<f32> = (0..256).map(|i| (i as f32 * 0.13).sin()).collect();
        let noisy: Vec<f32> = base
            .iter()
            .enumerate()
            .map(|(i, &x)| 2.0 * x + 0.001 * ((i * 31 % 7) as f32 - 3.0))
            .collect();
        let data = interleave(&base, &noisy);
        let model = calculate_pca(&data, 2, 1).unwrap();
        assert_eq!(model.matrix.len(), 2);
        // Dominant direction is (1, 2)/sqrt(5)
        let ratio = model.matrix[1] / model.matrix[0];
        assert!((ratio - 2.0).abs() < 0.05, "ratio {ratio}");
    }

    #[test]
    fn test_whitening_unit_variance() {
        let a: Vec<f32> = (0..512).map(|i| 3.0 * (i as f32 * 0.11).sin()).collect();
        let b: Vec<f32> = (0..512).map(|i| 0.5 * (i as f32 * 0.29).cos()).collect();
        let data = interleave(&a, &b);
        let model = calculate_whitening(&data, 2, 2).unwrap();

        // Project and measure component variances
        let mut sums = [0.0f64; 2];
        let mut sq = [0.0f64; 2];
        let frames = data.len() / 2;
        for frame in data.chunks_exact(2) {
            for comp in 0..2 {
                let mut y = 0.0f64;
                for ch in 0..2 {
                    y += model.matrix[comp * 2 + ch] as f64
                        * (frame[ch] as f64 - model.mean[ch] as f64);
                }
                sums[comp] += y;
                sq[comp] += y * y;
            }
        }
        for comp in 0..2 {
            let mean = sums[comp] / frames as f64;
            let var = sq[comp] / (frames as f64 - 1.0) - mean * mean;
            assert!((var - 1.0).abs() < 0.05, "component {comp} variance {var}");
        }
    }

    #[test]
    fn test_ica_separates_mixed_tones() {
        // Two independent-ish sources mixed into two channels
        let s1: Vec<f64> = (0..2048).map(|i| (i as f64 * 0.021).sin()).collect();
        let s2: Vec<f64> = (0..2048).map(|i| ((i as f64 * 0.0047).sin()).signum() * 0.7).collect();
        let mut data = Vec::with_capacity(4096);
        for i in 0..2048 {
            data.push((0.6 * s1[i] + 0.4 * s2[i]) as f32);
            data.push((0.3 * s1[i] - 0.8 * s2[i]) as f32);
        }
        let model = calculate_ica(&data, 2, 2).unwrap();
        assert_eq!(model.matrix.len(), 4);
        assert!(model.matrix.iter().all(|x| x.is_finite()));

        // Recovered components should be much less correlated than the mixtures
        let mut y1 = Vec::with_capacity(2048);
        let mut y2 = Vec::with_capacity(2048);
        for frame in data.chunks_exact(2) {
            let x0 = frame[0] as f64 - model.mean[0] as f64;
            let x1 = frame[1] as f64 - model.mean[1] as f64;
            y1.push(model.matrix[0] as f64 * x0 + model.matrix[1] as f64 * x1);
            y2.push(model.matrix[2] as f64 * x0 + model.matrix[3] as f64 * x1);
        }
        let corr = |a: &[f64], b: &[f64]| {
            let n = a.len() as f64;
            let ma = a.iter().sum::<f64>() / n;
            let mb = b.iter().sum::<f64>() / n;
            let mut num = 0.0;
            let mut da = 0.0;
            let mut db = 0.0;
            for (x, y) in a.iter().zip(b) {
                num += (x - ma) * (y - mb);
                da += (x - ma) * (x - ma);
                db += (y - mb) * (y - mb);
            }
            num / (da * db).sqrt()
        };
        assert!(corr(&y1, &y2).abs() < 0.1);
    }

    #[test]
    fn test_csp_orders_class_variance() {
        // Class A loud on channel 0, class B loud on channel 1
        let quiet: Vec<f32> = (0..1024).map(|i| 0.1 * (i as f32 * 0.31).sin()).collect();
        let loud: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.17).sin()).collect();
        let class_a = interleave(&loud, &quiet);
        let class_b = interleave(&quiet, &loud);
        let model = calculate_csp(&class_a, &class_b, 2, 2).unwrap();

        let variance = |data: &[f32], row: usize| {
            let mut acc = 0.0f64;
            for frame in data.chunks_exact(2) {
                let mut y = 0.0f64;
                for ch in 0..2 {
                    y += model.matrix[row * 2 + ch] as f64
                        * (frame[ch] as f64 - model.mean[ch] as f64);
                }
                acc += y * y;
            }
            acc / (data.len() / 2) as f64
        };
        // Filter 0 favors class A, filter 1 favors class B
        assert!(variance(&class_a, 0) > variance(&class_b, 0));
        assert!(variance(&class_b, 1) > variance(&class_a, 1));
    }

    #[test]
    fn test_beamformer_blocking_orthogonality() {
        let weights = calculate_beamformer_weights(&[1.0, 1.0, 1.0, 1.0]).unwrap();
        let n = weights.channels;
        let norm: f32 = weights.steering.iter().map(|x| x * x).sum();
        assert!((norm - 1.0).abs() < 1e-5);

        for col in 0..n - 1 {
            let column = &weights.blocking[col * n..(col + 1) * n];
            let against_steering: f32 = column
                .iter()
                .zip(&weights.steering)
                .map(|(b, s)| b * s)
                .sum();
            assert!(against_steering.abs() < 1e-5, "column {col} leaks target");
            let len: f32 = column.iter().map(|x| x * x).sum();
            assert!((len - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_beamformer_rejects_zero_steering() {
        assert!(calculate_beamformer_weights(&[0.0, 0.0]).is_err());
    }
}
