//! Adaptive filter stages
//!
//! Both stages consume exactly 2 channels: channel 0 is the primary input
//! x[n], channel 1 the desired/reference d[n]. The prediction error
//! e[n] = d[n] - y[n] is written to both channels.
//!
//! - `lmsFilter`: LMS with optional power-normalized step (NLMS) and leakage
//! - `rlsFilter`: recursive least squares with inverse-covariance update
//!
//! Non-finite weights after an update reset the filter deterministically and
//! emit an `error` event; the stream keeps flowing.

use serde_json::{json, Value};

use sf_core::{Sample, SfError, SfResult};

use crate::params::{opt_bool, opt_f64, req_usize, state_f64, state_f64_vec, state_usize};
use crate::{Stage, StageDescriptor, StageEvent};

/// Power-estimate smoothing for NLMS
const NLMS_BETA: f64 = 0.99;
/// Step-size regularizer for NLMS
const NLMS_DELTA: f64 = 1e-6;

// ============ Tap History ============

/// Circular input history, newest sample first
#[derive(Debug, Clone)]
struct TapHistory {
    buffer: Vec<f64>,
    head: usize,
}

impl TapHistory {
    fn new(taps: usize) -> Self {
        Self {
            buffer: vec![0.0; taps],
            head: 0,
        }
    }

    #[inline]
    fn push(&mut self, value: f64) {
        let n = self.buffer.len();
        self.head = (self.head + n - 1) % n;
        self.buffer[self.head] = value;
    }

    /// x[n - i]
    #[inline]
    fn at(&self, i: usize) -> f64 {
        self.buffer[(self.head + i) % self.buffer.len()]
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.head = 0;
    }

    /// Chronological copy, newest first
    fn snapshot(&self) -> Vec<f64> {
        (0..self.buffer.len()).map(|i| self.at(i)).collect()
    }

    fn restore(&mut self, newest_first: &[f64]) {
        self.buffer.clear();
        self.buffer.extend_from_slice(newest_first);
        self.head = 0;
    }
}

// ============ LMS ============

/// LMS adaptive filter (plain / NLMS / leaky)
pub struct LmsFilter {
    num_taps: usize,
    mu: f64,
    leak: f64,
    nlms: bool,
    weights: Vec<f64>,
    history: TapHistory,
    power: f64,
    events: Vec<StageEvent>,
}

impl LmsFilter {
    pub fn from_params(params: &Value) -> SfResult<Self> {
        let num_taps = req_usize(params, "numTaps")?;
        if num_taps == 0 {
            return Err(SfError::invalid_param("numTaps", "must be positive"));
        }
        let mu = opt_f64(params, "learningRate")?.unwrap_or(0.01);
        if mu <= 0.0 || mu > 1.0 {
            return Err(SfError::invalid_param("learningRate", "must be in (0, 1]"));
        }
        let leak = opt_f64(params, "lambda")?.unwrap_or(0.0);
        if !(0.0..1.0).contains(&leak) {
            return Err(SfError::invalid_param("lambda", "must be in [0, 1)"));
        }
        let nlms = opt_bool(params, "nlms", false)?;
        Ok(Self {
            num_taps,
            mu,
            leak,
            nlms,
            weights: vec![0.0; num_taps],
            history: TapHistory::new(num_taps),
            power: 0.0,
            events: Vec::new(),
        })
    }

    fn diverged(&self) -> bool {
        self.weights.iter().any(|w| !w.is_finite())
    }

    fn reset_filter(&mut self) {
        self.weights.fill(0.0);
        self.history.reset();
        self.power = 0.0;
    }

    fn step(&mut self, x: f64, d: f64) -> f64 {
        self.history.push(x);

        let mut y = 0.0;
        for (i, &w) in self.weights.iter().enumerate() {
            y += w * self.history.at(i);
        }
        let e = d - y;

        let step = if self.nlms {
            self.power = NLMS_BETA * self.power + (1.0 - NLMS_BETA) * x * x;
            self.mu / (self.power + NLMS_DELTA)
        } else {
            self.mu
        };

        let decay = 1.0 - self.mu * self.leak;
        for (i, w) in self.weights.iter_mut().enumerate() {
            *w = decay * *w + step * e * self.history.at(i);
        }

        if !e.is_finite() || self.diverged() {
            let error = SfError::NumericalDivergence {
                stage: "lmsFilter".into(),
                detail: "weights became non-finite, filter reset".into(),
            };
            log::error!("{error}");
            self.events.push(StageEvent::error(error.to_string()));
            self.reset_filter();
            return 0.0;
        }
        e
    }
}

impl Stage for LmsFilter {
    fn type_name(&self) -> &'static str {
        "lmsFilter"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(
            self.type_name(),
            json!({
                "numTaps": self.num_taps,
                "learningRate": self.mu,
                "lambda": self.leak,
                "nlms": self.nlms,
            }),
        )
    }

    fn required_channels(&self) -> Option<usize> {
        Some(2)
    }

    fn process(
        &mut self,
        block: &mut [Sample],
        channels: usize,
        _timestamps: &[f32],
    ) -> SfResult<()> {
        if channels != 2 {
            return Err(SfError::ChannelMismatch {
                expected: 2,
                got: channels,
            });
        }
        for frame in block.chunks_exact_mut(2) {
            let e = self.step(frame[0] as f64, frame[1] as f64) as Sample;
            frame[0] = e;
            frame[1] = e;
        }
        Ok(())
    }

    fn save_state(&self) -> Value {
        json!({
            "numTaps": self.num_taps,
            "weights": &self.weights,
            "history": self.history.snapshot(),
            "power": self.power,
        })
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        let taps = state_usize(state, "numTaps")?;
        if taps != self.num_taps {
            return Err(SfError::state_mismatch(
                "numTaps",
                format!("checkpoint has {taps}, filter has {}", self.num_taps),
            ));
        }
        let weights = state_f64_vec(state, "weights")?;
        let history = state_f64_vec(state, "history")?;
        if weights.len() != self.num_taps || history.len() != self.num_taps {
            return Err(SfError::state_mismatch("weights", "tap vector length mismatch"));
        }
        if weights.iter().chain(&history).any(|v| !v.is_finite()) {
            return Err(SfError::state_mismatch("weights", "non-finite values"));
        }
        Ok(())
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        self.validate_state(state)?;
        self.weights = state_f64_vec(state, "weights")?;
        self.history.restore(&state_f64_vec(state, "history")?);
        self.power = state_f64(state, "power")?;
        Ok(())
    }

    fn reset(&mut self) {
        self.reset_filter();
    }

    fn drain_events(&mut self) -> Vec<StageEvent> {
        std::mem::take(&mut self.events)
    }
}

// ============ RLS ============

/// Recursive least squares adaptive filter
///
/// O(taps^2) per sample; the inverse covariance P starts at `I / delta` and
/// is refreshed with the forgetting factor every update.
pub struct RlsFilter {
    num_taps: usize,
    lambda: f64,
    delta: f64,
    weights: Vec<f64>,
    history: TapHistory,
    /// Inverse covariance, row-major taps x taps
    p: Vec<f64>,
    events: Vec<StageEvent>,
}

impl RlsFilter {
    pub fn from_params(params: &Value) -> SfResult<Self> {
        let num_taps = req_usize(params, "numTaps")?;
        if num_taps == 0 {
            return Err(SfError::invalid_param("numTaps", "must be positive"));
        }
        let lambda = opt_f64(params, "lambda")?.unwrap_or(0.99);
        if lambda <= 0.0 || lambda > 1.0 {
            return Err(SfError::invalid_param("lambda", "must be in (0, 1]"));
        }
        let delta = opt_f64(params, "delta")?.unwrap_or(0.01);
        if delta <= 0.0 {
            return Err(SfError::invalid_param("delta", "must be > 0"));
        }
        let mut filter = Self {
            num_taps,
            lambda,
            delta,
            weights: vec![0.0; num_taps],
            history: TapHistory::new(num_taps),
            p: Vec::new(),
            events: Vec::new(),
        };
        filter.reset_covariance();
        Ok(filter)
    }

    fn reset_covariance(&mut self) {
        let n = self.num_taps;
        self.p = vec![0.0; n * n];
        let diag = 1.0 / self.delta;
        for i in 0..n {
            self.p[i * n + i] = diag;
        }
    }

    fn reset_filter(&mut self) {
        self.weights.fill(0.0);
        self.history.reset();
        self.reset_covariance();
    }

    fn diverged(&self) -> bool {
        self.weights.iter().any(|w| !w.is_finite()) || self.p.iter().any(|v| !v.is_finite())
    }

    fn step(&mut self, x_new: f64, d: f64) -> f64 {
        let n = self.num_taps;
        self.history.push(x_new);
        let x: Vec<f64> = (0..n).map(|i| self.history.at(i)).collect();

        // pi = P * x
        let mut pi = vec![0.0; n];
        for (i, slot) in pi.iter_mut().enumerate() {
            let row = &self.p[i * n..(i + 1) * n];
            let mut acc = 0.0;
            for (j, &xv) in x.iter().enumerate() {
                acc += row[j] * xv;
            }
            *slot = acc;
        }

        let denom = self.lambda + x.iter().zip(&pi).map(|(a, b)| a * b).sum::<f64>();
        let gain: Vec<f64> = pi.iter().map(|v| v / denom).collect();

        let y: f64 = self.weights.iter().zip(&x).map(|(w, xv)| w * xv).sum();
        let e = d - y;

        for (w, &k) in self.weights.iter_mut().zip(&gain) {
            *w += e * k;
        }

        // P = (P - k * pi^T) / lambda
        let inv_lambda = 1.0 / self.lambda;
        for i in 0..n {
            for j in 0..n {
                self.p[i * n + j] = (self.p[i * n + j] - gain[i] * pi[j]) * inv_lambda;
            }
        }

        if !e.is_finite() || self.diverged() {
            let error = SfError::NumericalDivergence {
                stage: "rlsFilter".into(),
                detail: "covariance became non-finite, filter reset".into(),
            };
            log::error!("{error}");
            self.events.push(StageEvent::error(error.to_string()));
            self.reset_filter();
            return 0.0;
        }
        e
    }
}

impl Stage for RlsFilter {
    fn type_name(&self) -> &'static str {
        "rlsFilter"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(
            self.type_name(),
            json!({
                "numTaps": self.num_taps,
                "lambda": self.lambda,
                "delta": self.delta,
            }),
        )
    }

    fn required_channels(&self) -> Option<usize> {
        Some(2)
    }

    fn process(
        &mut self,
        block: &mut [Sample],
        channels: usize,
        _timestamps: &[f32],
    ) -> SfResult<()> {
        if channels != 2 {
            return Err(SfError::ChannelMismatch {
                expected: 2,
                got: channels,
            });
        }
        for frame in block.chunks_exact_mut(2) {
            let e = self.step(frame[0] as f64, frame[1] as f64) as Sample;
            frame[0] = e;
            frame[1] = e;
        }
        Ok(())
    }

    fn save_state(&self) -> Value {
        json!({
            "numTaps": self.num_taps,
            "weights": &self.weights,
            "history": self.history.snapshot(),
            "covariance": &self.p,
        })
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        let taps = state_usize(state, "numTaps")?;
        if taps != self.num_taps {
            return Err(SfError::state_mismatch(
                "numTaps",
                format!("checkpoint has {taps}, filter has {}", self.num_taps),
            ));
        }
        let weights = state_f64_vec(state, "weights")?;
        if weights.len() != self.num_taps {
            return Err(SfError::state_mismatch("weights", "tap vector length mismatch"));
        }
        let covariance = state_f64_vec(state, "covariance")?;
        if covariance.len() != self.num_taps * self.num_taps {
            return Err(SfError::state_mismatch(
                "covariance",
                "inverse covariance has the wrong shape",
            ));
        }
        if weights.iter().chain(&covariance).any(|v| !v.is_finite()) {
            return Err(SfError::state_mismatch("covariance", "non-finite values"));
        }
        Ok(())
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        self.validate_state(state)?;
        self.weights = state_f64_vec(state, "weights")?;
        self.history.restore(&state_f64_vec(state, "history")?);
        self.p = state_f64_vec(state, "covariance")?;
        Ok(())
    }

    fn reset(&mut self) {
        self.reset_filter();
    }

    fn drain_events(&mut self) -> Vec<StageEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;

    /// Drive a 2-channel filter with (x, d) pairs, returning the error signal
    fn drive(stage: &mut dyn Stage, x: &[f32], d: &[f32]) -> Vec<f32> {
        let mut block: Vec<f32> = x.iter().zip(d).flat_map(|(&a, &b)| [a, b]).collect();
        let ts: Vec<f32> = (0..x.len()).map(|i| i as f32).collect();
        stage.process(&mut block, 2, &ts).unwrap();
        block.chunks_exact(2).map(|f| f[0]).collect()
    }

    /// Unknown 4-tap system the filters should identify
    fn reference_system(x: &[f32]) -> Vec<f32> {
        let h = [0.6f64, -0.3, 0.15, 0.05];
        (0..x.len())
            .map(|n| {
                let mut acc = 0.0;
                for (k, &hk) in h.iter().enumerate() {
                    if n >= k {
                        acc += hk * x[n - k] as f64;
                    }
                }
                acc as f32
            })
            .collect()
    }

    fn noise(len: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.random_range(-1.0..1.0)).collect()
    }

    #[test]
    fn test_lms_identifies_fir_system() {
        let mut lms = LmsFilter::from_params(
            &json!({"numTaps": 8, "learningRate": 0.05}),
        )
        .unwrap();
        let x = noise(2000, 7);
        let d = reference_system(&x);
        let errors = drive(&mut lms, &x, &d);

        let tail_mse: f64 = errors[1600..]
            .iter()
            .map(|&e| e as f64 * e as f64)
            .sum::<f64>()
            / 400.0;
        let signal_ms: f64 =
            d[..400].iter().map(|&v| v as f64 * v as f64).sum::<f64>() / 400.0;
        assert!(
            tail_mse < 0.05 * signal_ms,
            "tail MSE {tail_mse} vs signal {signal_ms}"
        );
    }

    #[test]
    fn test_nlms_converges_faster_than_lms() {
        let x = noise(600, 11);
        let d = reference_system(&x);

        let mut plain =
            LmsFilter::from_params(&json!({"numTaps": 8, "learningRate": 0.01})).unwrap();
        let mut normalized = LmsFilter::from_params(
            &json!({"numTaps": 8, "learningRate": 0.1, "nlms": true}),
        )
        .unwrap();

        let mse = |errors: &[f32]| -> f64 {
            errors[400..]
                .iter()
                .map(|&e| e as f64 * e as f64)
                .sum::<f64>()
                / 200.0
        };
        let plain_mse = mse(&drive(&mut plain, &x, &d));
        let nlms_mse = mse(&drive(&mut normalized, &x, &d));
        assert!(nlms_mse < plain_mse, "nlms {nlms_mse} vs lms {plain_mse}");
    }

    #[test]
    fn test_lms_divergence_resets_and_reports() {
        let mut lms = LmsFilter::from_params(
            &json!({"numTaps": 4, "learningRate": 1.0}),
        )
        .unwrap();
        let x = vec![1e30f32; 32];
        let d = vec![1e30f32; 32];
        let _ = drive(&mut lms, &x, &d);
        let events = lms.drain_events();
        assert!(!events.is_empty());
        assert!(lms.weights.iter().all(|w| w.is_finite()));
    }

    #[test]
    fn test_lms_rejects_bad_params() {
        assert!(LmsFilter::from_params(&json!({"numTaps": 0})).is_err());
        assert!(
            LmsFilter::from_params(&json!({"numTaps": 4, "learningRate": 1.5})).is_err()
        );
        assert!(LmsFilter::from_params(&json!({"numTaps": 4, "lambda": 1.0})).is_err());
    }

    #[test]
    fn test_lms_requires_two_channels() {
        let mut lms = LmsFilter::from_params(&json!({"numTaps": 4})).unwrap();
        let mut block = vec![0.0f32; 8];
        assert!(matches!(
            lms.process(&mut block, 1, &[0.0; 8]),
            Err(SfError::ChannelMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn test_rls_identifies_fir_system_quickly() {
        let mut rls = RlsFilter::from_params(
            &json!({"numTaps": 8, "lambda": 0.99, "delta": 0.01}),
        )
        .unwrap();
        let x = noise(400, 23);
        let d = reference_system(&x);
        let errors = drive(&mut rls, &x, &d);

        // RLS locks on within tens of samples
        let tail_mse: f64 = errors[200..]
            .iter()
            .map(|&e| e as f64 * e as f64)
            .sum::<f64>()
            / 200.0;
        assert!(tail_mse < 1e-6, "tail MSE {tail_mse}");
    }

    #[test]
    fn test_rls_state_roundtrip() {
        let params = json!({"numTaps": 4, "lambda": 0.98, "delta": 0.1});
        let mut a = RlsFilter::from_params(&params).unwrap();
        let x = noise(64, 31);
        let d = reference_system(&x);
        drive(&mut a, &x, &d);
        let state = a.save_state();

        let mut b = RlsFilter::from_params(&params).unwrap();
        b.restore_state(&state).unwrap();
        let x2 = noise(16, 37);
        let d2 = reference_system(&x2);
        assert_eq!(drive(&mut a, &x2, &d2), drive(&mut b, &x2, &d2));
    }

    #[test]
    fn test_rls_restore_rejects_wrong_taps() {
        let a = RlsFilter::from_params(&json!({"numTaps": 4})).unwrap();
        let state = a.save_state();
        let mut b = RlsFilter::from_params(&json!({"numTaps": 8})).unwrap();
        assert!(b.restore_state(&state).is_err());
    }

    #[test]
    fn test_lms_state_roundtrip() {
        let params = json!({"numTaps": 6, "learningRate": 0.1, "nlms": true});
        let mut a = LmsFilter::from_params(&params).unwrap();
        let x = noise(128, 41);
        let d = reference_system(&x);
        drive(&mut a, &x, &d);
        let state = a.save_state();

        let mut b = LmsFilter::from_params(&params).unwrap();
        b.restore_state(&state).unwrap();
        let x2 = noise(32, 43);
        let d2 = reference_system(&x2);
        assert_eq!(drive(&mut a, &x2, &d2), drive(&mut b, &x2, &d2));
    }
}
