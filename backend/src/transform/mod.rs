//! Conversion core.
//!
//! - Assembler: validated rows to activities and organisations
//! - Failures: row-error threshold
//! - Pipeline: stage orchestration and result envelopes

pub mod assembler;
pub mod failures;
pub mod pipeline;

pub use assembler::{assemble, Assembler, Assembly, MergeOutcome};
pub use failures::FailureTracker;
pub use pipeline::*;
