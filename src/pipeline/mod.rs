//! # Pipeline Module
//!
//! Runs sampling, per-frame effects and encoding in sequence and reports
//! progress along the way.

pub mod orchestrator;
pub mod progress;

pub use orchestrator::{PipelineOrchestrator, PipelineState, RunSummary};
pub use progress::{FrameOutcome, NoopProgress, ProgressSink, TracingProgress};
