//! Structured log records

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Severity levels, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

/// One structured log record
///
/// `timestamp_ms` is monotonic milliseconds from the emitting pipeline's
/// clock origin, not wall time. Priority runs 1 (lowest) to 10.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub topic: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
    pub timestamp_ms: f64,
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl LogRecord {
    pub fn new(topic: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            level,
            message: message.into(),
            context: HashMap::new(),
            timestamp_ms: 0.0,
            priority: default_priority(level),
            trace_id: None,
            span_id: None,
            correlation_id: None,
        }
    }

    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    /// Stamp the record with elapsed time from a clock origin
    pub fn stamped(mut self, origin: Instant) -> Self {
        self.timestamp_ms = origin.elapsed().as_secs_f64() * 1000.0;
        self
    }
}

fn default_priority(level: LogLevel) -> u8 {
    match level {
        LogLevel::Trace => 1,
        LogLevel::Debug => 2,
        LogLevel::Info => 4,
        LogLevel::Warn => 6,
        LogLevel::Error => 8,
        LogLevel::Fatal => 10,
    }
}
