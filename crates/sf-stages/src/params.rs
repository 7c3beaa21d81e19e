//! Parameter and state document helpers
//!
//! Stage parameters arrive as `serde_json` records from the builder; state
//! sub-documents come from checkpoints. The two families below differ only
//! in the error they classify into: bad parameters are construction errors,
//! bad state is a checkpoint format mismatch.

use serde_json::Value;

use sf_core::{Sample, SfError, SfResult};

// ============ Parameter Access (construction) ============

pub fn req_usize(params: &Value, field: &str) -> SfResult<usize> {
    params
        .get(field)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .ok_or_else(|| SfError::invalid_param(field, "required non-negative integer"))
}

pub fn opt_usize(params: &Value, field: &str) -> SfResult<Option<usize>> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|v| Some(v as usize))
            .ok_or_else(|| SfError::invalid_param(field, "expected a non-negative integer")),
    }
}

pub fn req_f64(params: &Value, field: &str) -> SfResult<f64> {
    params
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| SfError::invalid_param(field, "required number"))
}

pub fn opt_f64(params: &Value, field: &str) -> SfResult<Option<f64>> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| SfError::invalid_param(field, "expected a number")),
    }
}

pub fn req_str<'a>(params: &'a Value, field: &str) -> SfResult<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| SfError::invalid_param(field, "required string"))
}

pub fn opt_str<'a>(params: &'a Value, field: &str) -> SfResult<Option<&'a str>> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| SfError::invalid_param(field, "expected a string")),
    }
}

pub fn opt_bool(params: &Value, field: &str, default: bool) -> SfResult<bool> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_bool()
            .ok_or_else(|| SfError::invalid_param(field, "expected a boolean")),
    }
}

pub fn req_sample_array(params: &Value, field: &str) -> SfResult<Vec<Sample>> {
    let array = params
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| SfError::invalid_param(field, "required numeric array"))?;
    array
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|x| x as Sample)
                .ok_or_else(|| SfError::invalid_param(field, "array entries must be numbers"))
        })
        .collect()
}

pub fn req_usize_array(params: &Value, field: &str) -> SfResult<Vec<usize>> {
    let array = params
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| SfError::invalid_param(field, "required integer array"))?;
    array
        .iter()
        .map(|v| {
            v.as_u64().map(|x| x as usize).ok_or_else(|| {
                SfError::invalid_param(field, "array entries must be non-negative integers")
            })
        })
        .collect()
}

// ============ State Access (checkpoint restore) ============

pub fn state_usize(state: &Value, field: &str) -> SfResult<usize> {
    state
        .get(field)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .ok_or_else(|| SfError::state_mismatch(field, "missing or non-integer"))
}

pub fn state_f64(state: &Value, field: &str) -> SfResult<f64> {
    state
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| SfError::state_mismatch(field, "missing or non-numeric"))
}

pub fn state_sample_vec(state: &Value, field: &str) -> SfResult<Vec<Sample>> {
    let array = state
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| SfError::state_mismatch(field, "missing or non-array"))?;
    array
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|x| x as Sample)
                .ok_or_else(|| SfError::state_mismatch(field, "entries must be numbers"))
        })
        .collect()
}

pub fn state_f64_vec(state: &Value, field: &str) -> SfResult<Vec<f64>> {
    let array = state
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| SfError::state_mismatch(field, "missing or non-array"))?;
    array
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| SfError::state_mismatch(field, "entries must be numbers"))
        })
        .collect()
}

/// Serialize a sample slice losslessly enough for state documents
pub fn samples_to_json(samples: &[Sample]) -> Value {
    Value::Array(
        samples
            .iter()
            .map(|&x| serde_json::json!(x as f64))
            .collect(),
    )
}
