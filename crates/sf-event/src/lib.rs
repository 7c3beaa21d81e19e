//! sf-event: Observability substrate for StreamForge
//!
//! Non-blocking, allocation-bounded observability for the pipeline core:
//! - `record` - Log levels and structured log records
//! - `ring` - Fixed-capacity log ring with overwrite + drain
//! - `topic` - Dotted topic patterns (`*` matches exactly one segment)
//! - `observer` - Callback set the executor invokes after compute
//! - `drift` - Timestamp drift detection against an expected period
//!
//! Everything here is single-threaded by contract (spec: one `process` call
//! at a time per pipeline); the ring is a plain fixed buffer, not a
//! concurrent queue.

mod drift;
mod observer;
mod record;
mod ring;
mod topic;

pub use drift::*;
pub use observer::*;
pub use record::*;
pub use ring::*;
pub use topic::*;
