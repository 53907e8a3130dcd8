use tracing::{debug, info};

use crate::pipeline::orchestrator::PipelineState;

/// How one frame left the effect stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Replaced,
    UnchangedNoImage,
    UnchangedFault,
}

/// One-way observer of pipeline progress
///
/// Implementations must return quickly and must not panic; the pipeline does
/// not wait on or check them.
pub trait ProgressSink: Send + Sync {
    /// Called after every state transition
    fn on_stage(&self, state: PipelineState);

    /// Called after frame `done` of `total` (1-based) has been processed
    fn on_frame(&self, done: usize, total: usize, outcome: FrameOutcome);
}

/// Reports progress through `tracing`
#[derive(Debug, Clone)]
pub struct TracingProgress {
    every: usize,
}

impl TracingProgress {
    /// Log at info level every `every` frames, debug otherwise
    pub fn new(every: usize) -> Self {
        Self { every: every.max(1) }
    }
}

impl Default for TracingProgress {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ProgressSink for TracingProgress {
    fn on_stage(&self, state: PipelineState) {
        info!("{} {}", state.icon(), state);
    }

    fn on_frame(&self, done: usize, total: usize, outcome: FrameOutcome) {
        if done == 1 || done == total || done % self.every == 0 {
            info!("   Processing frame {}/{}", done, total);
        }
        debug!("Frame {}/{}: {:?}", done, total, outcome);
    }
}

/// Discards all progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_stage(&self, _state: PipelineState) {}

    fn on_frame(&self, _done: usize, _total: usize, _outcome: FrameOutcome) {}
}
