//! sf-state: Checkpoint serialization for StreamForge pipelines
//!
//! A checkpoint is a self-describing JSON document: pipeline metadata plus
//! one sub-document per stage (its type, critical configuration, and
//! private state). The engine enforces the structural match protocol on
//! load; this crate owns the document shape and the version gate.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sf_core::{SfError, SfResult};

/// Current checkpoint schema version
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// One stage's entry in a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCheckpoint {
    /// Stable stage type identifier
    pub stage_type: String,
    /// Critical configuration (window sizes, taps, factors, channels)
    pub config: Value,
    /// Private state sub-document
    pub state: Value,
}

/// Whole-pipeline checkpoint document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub schema_version: u32,
    /// Capture wall-clock time, Unix milliseconds
    pub captured_at_ms: u64,
    /// Channel count the pipeline was built for, when declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<usize>,
    pub stage_count: usize,
    pub stages: Vec<StageCheckpoint>,
}

impl Checkpoint {
    pub fn new(channels: Option<usize>, stages: Vec<StageCheckpoint>) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            captured_at_ms: current_timestamp_ms(),
            channels,
            stage_count: stages.len(),
            stages,
        }
    }

    /// Serialize to the wire document
    pub fn to_json(&self) -> SfResult<String> {
        serde_json::to_string(self)
            .map_err(|e| SfError::state_mismatch("checkpoint", format!("serialize: {e}")))
    }

    /// Parse and gate on schema version and internal consistency
    pub fn from_json(text: &str) -> SfResult<Self> {
        let checkpoint: Checkpoint = serde_json::from_str(text)
            .map_err(|e| SfError::state_mismatch("checkpoint", format!("parse: {e}")))?;
        if checkpoint.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(SfError::state_mismatch(
                "schema_version",
                format!(
                    "checkpoint is version {}, engine supports {CHECKPOINT_SCHEMA_VERSION}",
                    checkpoint.schema_version
                ),
            ));
        }
        if checkpoint.stage_count != checkpoint.stages.len() {
            return Err(SfError::state_mismatch(
                "stage_count",
                format!(
                    "declared {} stages but document carries {}",
                    checkpoint.stage_count,
                    checkpoint.stages.len()
                ),
            ));
        }
        Ok(checkpoint)
    }
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
