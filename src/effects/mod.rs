//! # Effects Module
//!
//! The per-frame transformation contract. An [`EffectCapability`] performs a
//! single call to an image model; the [`FrameEffectApplier`] wraps it so that
//! every failure degrades to passing the frame through unchanged.

pub mod traits;
pub mod applier;
pub mod gemini;
pub mod registry;

pub use traits::{CapabilityResponse, EffectCapability, EffectRequest, EffectResult, UnchangedReason};
pub use applier::FrameEffectApplier;
pub use gemini::GeminiCapability;
pub use registry::ModelRegistry;
