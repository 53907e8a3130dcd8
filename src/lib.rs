//! # video-fx
//!
//! Sample frames from a video, restyle each one with a generative image
//! model, and reassemble the results into a new video.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::{path::Path, sync::Arc};
//! use video_fx::{
//!     config::Config,
//!     effects::{FrameEffectApplier, GeminiCapability, ModelRegistry},
//!     pipeline::PipelineOrchestrator,
//!     video::{FfmpegBackend, FrameEncoder, FrameSampler},
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let backend = Arc::new(FfmpegBackend::new(&config.ffmpeg, 85, 4));
//!
//! let sampler = FrameSampler::new(backend.clone()).with_target_fps(Some(1.0));
//! let model = ModelRegistry::resolve("pro");
//! let applier = FrameEffectApplier::new(GeminiCapability::new(&config.effect, model)?);
//! let encoder = FrameEncoder::new(backend);
//!
//! let mut pipeline = PipelineOrchestrator::new(sampler, applier, encoder);
//! let summary = pipeline
//!     .run(Path::new("input.mp4"), Path::new("output.mp4"), "Turn this into a collage")
//!     .await?;
//! println!("{} of {} frames replaced", summary.replaced, summary.total_frames);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`video`] - Frame types, the sampler, the encoder and the ffmpeg backend
//! - [`effects`] - The per-frame effect contract and the Gemini capability
//! - [`pipeline`] - The orchestrator state machine and progress reporting
//! - [`prompt`] - Instruction templates
//! - [`config`] - Configuration management
//!
//! ## Custom Capabilities
//!
//! Any image model can be plugged in by implementing
//! [`EffectCapability`](effects::EffectCapability):
//!
//! ```rust,no_run
//! use video_fx::effects::{CapabilityResponse, EffectCapability, EffectRequest};
//! use video_fx::error::EffectFault;
//!
//! struct Passthrough;
//!
//! impl EffectCapability for Passthrough {
//!     fn name(&self) -> &str {
//!         "passthrough"
//!     }
//!
//!     async fn generate(&self, _request: EffectRequest<'_>) -> Result<CapabilityResponse, EffectFault> {
//!         Ok(CapabilityResponse::NoImage { text: None })
//!     }
//! }
//! ```

pub mod config;
pub mod effects;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod video;

#[cfg(test)]
mod testing;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    effects::{EffectCapability, FrameEffectApplier},
    error::{PipelineError, Result},
    pipeline::{PipelineOrchestrator, RunSummary},
    prompt::PromptTemplate,
};
