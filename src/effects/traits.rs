use std::io::Cursor;

use image::ImageOutputFormat;

use crate::{error::EffectFault, video::types::Frame};

/// One frame plus the instruction to apply to it
///
/// Borrows the frame for the duration of a single `generate` call, which
/// takes the request by value; the frame itself stays with the caller.
#[derive(Debug)]
pub struct EffectRequest<'a> {
    pub frame: &'a Frame,
    pub instruction: &'a str,
}

impl<'a> EffectRequest<'a> {
    pub fn new(frame: &'a Frame, instruction: &'a str) -> Self {
        Self { frame, instruction }
    }

    /// Encode the frame as PNG for upload
    pub fn frame_png(&self) -> Result<Vec<u8>, EffectFault> {
        let mut bytes = Vec::new();
        self.frame
            .as_image()
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .map_err(EffectFault::ImageEncode)?;
        Ok(bytes)
    }
}

/// What the capability sent back, classified once at the boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityResponse {
    /// Encoded image bytes (PNG, JPEG, ...)
    Image(Vec<u8>),

    /// No image in the response, optionally with descriptive text
    NoImage { text: Option<String> },
}

/// Something that can turn an image and an instruction into a new image
///
/// Implementations report every failure as an [`EffectFault`]; the
/// [`FrameEffectApplier`](crate::effects::FrameEffectApplier) decides what a
/// fault means for the pipeline.
#[allow(async_fn_in_trait)]
pub trait EffectCapability: Send + Sync {
    /// Returns a short name for logs
    fn name(&self) -> &str;

    /// Run the effect once
    async fn generate(&self, request: EffectRequest<'_>) -> Result<CapabilityResponse, EffectFault>;
}

/// Why a frame was passed through unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnchangedReason {
    /// The capability answered without an image
    NoImage,

    /// The capability call or its payload failed
    Fault(String),
}

/// Outcome of applying the effect to one frame
#[derive(Debug, Clone, PartialEq)]
pub enum EffectResult {
    /// A new frame with the same dimensions as the input
    Replaced(Frame),

    /// Keep the original frame
    Unchanged(UnchangedReason),
}
