//! Observer callback set
//!
//! Collaborators the executor calls after the compute phase of each
//! `process`. All callbacks run synchronously on the caller's thread; the
//! executor guards each invocation so a panicking callback is reported
//! under `pipeline.callback.error` instead of tearing the pipeline down.

use sf_core::Sample;

use crate::drift::DriftEvent;
use crate::record::LogRecord;
use crate::topic::TopicFilter;

/// Individual log record sink
pub type LogCallback = Box<dyn FnMut(&LogRecord) + Send>;
/// Batched (per-call flush) log sink
pub type LogBatchCallback = Box<dyn FnMut(&[LogRecord]) + Send>;
/// Post-process sample tap: (stage_name, samples, start_index, count)
pub type BatchCallback = Box<dyn FnMut(&str, &[Sample], usize, usize) + Send>;
/// Per-call completion: (pipeline_name, duration_ms)
pub type StageCompleteCallback = Box<dyn FnMut(&str, f64) + Send>;
/// Stage error notification: (stage_name, message)
pub type ErrorCallback = Box<dyn FnMut(&str, &str) + Send>;
/// Drift event sink
pub type DriftCallback = Box<dyn FnMut(&DriftEvent) + Send>;
/// Per-stage tap: (stage_type, block after that stage)
pub type TapCallback = Box<dyn FnMut(&str, &[Sample]) + Send>;

/// Callback configuration attached to a pipeline
#[derive(Default)]
pub struct Observer {
    pub on_log: Option<LogCallback>,
    pub on_log_batch: Option<LogBatchCallback>,
    pub on_batch: Option<BatchCallback>,
    pub on_stage_complete: Option<StageCompleteCallback>,
    pub on_error: Option<ErrorCallback>,
    pub on_drift: Option<DriftCallback>,
    /// Applied to every record before it reaches `on_log`/`on_log_batch`
    pub topic_filter: TopicFilter,
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("on_log", &self.on_log.is_some())
            .field("on_log_batch", &self.on_log_batch.is_some())
            .field("on_batch", &self.on_batch.is_some())
            .field("on_stage_complete", &self.on_stage_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_drift", &self.on_drift.is_some())
            .field("topic_filter", &self.topic_filter)
            .finish()
    }
}

impl Observer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when any log sink is attached
    pub fn wants_logs(&self) -> bool {
        self.on_log.is_some() || self.on_log_batch.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_observer_dispatch_shapes() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let mut observer = Observer::new();
        observer.on_log = Some(Box::new(move |record: &LogRecord| {
            assert_eq!(record.level, LogLevel::Info);
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(observer.wants_logs());

        let record = LogRecord::new("pipeline.test", LogLevel::Info, "hello");
        if let Some(cb) = observer.on_log.as_mut() {
            cb(&record);
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
