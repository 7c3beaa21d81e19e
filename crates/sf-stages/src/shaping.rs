//! Scalar shaping stages
//!
//! - `rectify`: full-wave |x| or half-wave max(x, 0), stateless
//! - `differentiator`: first difference, one sample of state per channel
//! - `integrator`: leaky accumulator `y[n] = x[n] + alpha * y[n-1]`

use serde_json::{json, Value};

use sf_core::{Sample, SfError, SfResult};

use crate::params::{opt_f64, req_str, state_f64_vec};
use crate::{Stage, StageDescriptor};

// ============ Rectify ============

/// Rectification mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectifyMode {
    Full,
    Half,
}

/// Stateless rectifier
pub struct RectifyStage {
    mode: RectifyMode,
}

impl RectifyStage {
    pub fn from_params(params: &Value) -> SfResult<Self> {
        let mode = match req_str(params, "mode")? {
            "full" => RectifyMode::Full,
            "half" => RectifyMode::Half,
            other => {
                return Err(SfError::invalid_param(
                    "mode",
                    format!("expected `full` or `half`, got `{other}`"),
                ));
            }
        };
        Ok(Self { mode })
    }
}

impl Stage for RectifyStage {
    fn type_name(&self) -> &'static str {
        "rectify"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(
            self.type_name(),
            json!({ "mode": if self.mode == RectifyMode::Full { "full" } else { "half" } }),
        )
    }

    fn process(
        &mut self,
        block: &mut [Sample],
        _channels: usize,
        _timestamps: &[f32],
    ) -> SfResult<()> {
        match self.mode {
            RectifyMode::Full => {
                for sample in block.iter_mut() {
                    *sample = sample.abs();
                }
            }
            RectifyMode::Half => {
                for sample in block.iter_mut() {
                    *sample = sample.max(0.0);
                }
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

// ============ Differentiator ============

/// First-difference stage
pub struct DifferentiatorStage {
    previous: Vec<f64>,
}

impl DifferentiatorStage {
    pub fn from_params(_params: &Value) -> SfResult<Self> {
        Ok(Self { previous: Vec::new() })
    }

    fn ensure_channels(&mut self, channels: usize) {
        if self.previous.len() != channels {
            self.previous = vec![0.0; channels];
        }
    }
}

impl Stage for DifferentiatorStage {
    fn type_name(&self) -> &'static str {
        "differentiator"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(self.type_name(), json!({}))
    }

    fn process(
        &mut self,
        block: &mut [Sample],
        channels: usize,
        _timestamps: &[f32],
    ) -> SfResult<()> {
        self.ensure_channels(channels);
        for frame in block.chunks_exact_mut(channels) {
            for (slot, prev) in frame.iter_mut().zip(self.previous.iter_mut()) {
                let x = *slot as f64;
                *slot = (x - *prev) as Sample;
                *prev = x;
            }
        }
        Ok(())
    }

    fn save_state(&self) -> Value {
        json!({ "previous": &self.previous })
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        state_f64_vec(state, "previous").map(|_| ())
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        self.previous = state_f64_vec(state, "previous")?;
        Ok(())
    }

    fn reset(&mut self) {
        self.previous.fill(0.0);
    }
}

// ============ Integrator ============

/// Leaky integrator
pub struct IntegratorStage {
    alpha: f64,
    accumulator: Vec<f64>,
}

impl IntegratorStage {
    pub fn from_params(params: &Value) -> SfResult<Self> {
        let alpha = opt_f64(params, "alpha")?.unwrap_or(1.0);
        if alpha <= 0.0 || alpha > 1.0 {
            return Err(SfError::invalid_param("alpha", "must be in (0, 1]"));
        }
        Ok(Self {
            alpha,
            accumulator: Vec::new(),
        })
    }

    fn ensure_channels(&mut self, channels: usize) {
        if self.accumulator.len() != channels {
            self.accumulator = vec![0.0; channels];
        }
    }
}

impl Stage for IntegratorStage {
    fn type_name(&self) -> &'static str {
        "integrator"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(self.type_name(), json!({ "alpha": self.alpha }))
    }

    fn process(
        &mut self,
        block: &mut [Sample],
        channels: usize,
        _timestamps: &[f32],
    ) -> SfResult<()> {
        self.ensure_channels(channels);
        for frame in block.chunks_exact_mut(channels) {
            for (slot, acc) in frame.iter_mut().zip(self.accumulator.iter_mut()) {
                *acc = *slot as f64 + self.alpha * *acc;
                *slot = *acc as Sample;
            }
        }
        Ok(())
    }

    fn save_state(&self) -> Value {
        json!({ "accumulator": &self.accumulator })
    }

    fn validate_state(&self, state: &Value) -> SfResult<()> {
        let acc = state_f64_vec(state, "accumulator")?;
        if acc.iter().any(|v| !v.is_finite()) {
            return Err(SfError::state_mismatch("accumulator", "non-finite values"));
        }
        Ok(())
    }

    fn restore_state(&mut self, state: &Value) -> SfResult<()> {
        self.validate_state(state)?;
        self.accumulator = state_f64_vec(state, "accumulator")?;
        Ok(())
    }

    fn reset(&mut self) {
        self.accumulator.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_rectify() {
        let mut s = RectifyStage::from_params(&json!({"mode": "full"})).unwrap();
        let mut block = vec![-1.0, 2.0, -3.0];
        s.process(&mut block, 1, &[0.0, 1.0, 2.0]).unwrap();
        assert_eq!(block, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_half_rectify() {
        let mut s = RectifyStage::from_params(&json!({"mode": "half"})).unwrap();
        let mut block = vec![-1.0, 2.0, -3.0];
        s.process(&mut block, 1, &[0.0, 1.0, 2.0]).unwrap();
        assert_eq!(block, vec![0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_differentiator_streams_across_calls() {
        let mut s = DifferentiatorStage::from_params(&json!({})).unwrap();
        let mut block = vec![1.0, 3.0, 6.0];
        s.process(&mut block, 1, &[0.0, 1.0, 2.0]).unwrap();
        assert_eq!(block, vec![1.0, 2.0, 3.0]);
        let mut block = vec![10.0];
        s.process(&mut block, 1, &[3.0]).unwrap();
        assert_eq!(block, vec![4.0]);
    }

    #[test]
    fn test_integrator_alpha_one_accumulates() {
        let mut s = IntegratorStage::from_params(&json!({"alpha": 1.0})).unwrap();
        let mut block = vec![1.0, 1.0, 1.0, 1.0];
        s.process(&mut block, 1, &[0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(block, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_integrator_leak_bounds_dc() {
        let mut s = IntegratorStage::from_params(&json!({"alpha": 0.5})).unwrap();
        let mut block = vec![1.0; 32];
        s.process(&mut block, 1, &(0..32).map(|i| i as f32).collect::<Vec<_>>())
            .unwrap();
        // Geometric series converges to 1 / (1 - alpha) = 2
        assert!((block[31] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_integrator_rejects_bad_alpha() {
        assert!(IntegratorStage::from_params(&json!({"alpha": 0.0})).is_err());
        assert!(IntegratorStage::from_params(&json!({"alpha": 1.5})).is_err());
    }

    #[test]
    fn test_differentiator_state_roundtrip() {
        let mut a = DifferentiatorStage::from_params(&json!({})).unwrap();
        let mut block = vec![5.0, 7.0];
        a.process(&mut block, 1, &[0.0, 1.0]).unwrap();
        let state = a.save_state();

        let mut b = DifferentiatorStage::from_params(&json!({})).unwrap();
        b.restore_state(&state).unwrap();
        let mut x1 = vec![10.0];
        let mut x2 = vec![10.0];
        a.process(&mut x1, 1, &[2.0]).unwrap();
        b.process(&mut x2, 1, &[2.0]).unwrap();
        assert_eq!(x1, x2);
    }
}
