//! sf-engine: Pipeline executor and builder for StreamForge
//!
//! Composes a linear sequence of stages over interleaved multi-channel
//! blocks:
//!
//! ```text
//! +---------------------------------------------------------------+
//! |                         Pipeline                              |
//! |                                                               |
//! |  block -> [stage 0] -> [stage 1] -> ... -> [stage N-1] -> out |
//! |              |             |                    |             |
//! |            events        events               events          |
//! |              v             v                    v             |
//! |       +-----------------------------------------------+      |
//! |       |  log ring -> topic filter -> per-call flush   |      |
//! |       +-----------------------------------------------+      |
//! +---------------------------------------------------------------+
//! ```
//!
//! - `process` mutates the caller's buffer in place when every stage keeps
//!   its geometry; resizing stages swap in a fresh buffer and the timestamp
//!   vector is rescaled by the stage's time-scale factor
//! - checkpoints round-trip the whole pipeline through `sf-state` with
//!   structural validation on load
//! - observability (ring flush, taps, drift events) runs synchronously
//!   after the compute phase

mod builder;
mod options;
mod pipeline;

pub use builder::*;
pub use options::*;
pub use pipeline::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
