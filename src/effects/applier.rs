use image::imageops::FilterType;
use tracing::{debug, info, warn};

use crate::effects::traits::{
    CapabilityResponse, EffectCapability, EffectRequest, EffectResult, UnchangedReason,
};
use crate::error::EffectFault;
use crate::video::types::Frame;

/// Applies an effect capability to frames without ever failing the caller
///
/// Each call makes exactly one attempt. Faults, empty answers and
/// undecodable images all become [`EffectResult::Unchanged`], so a long
/// batch survives individual bad frames.
pub struct FrameEffectApplier<C> {
    capability: C,
    resize_filter: FilterType,
}

impl<C: EffectCapability> FrameEffectApplier<C> {
    pub fn new(capability: C) -> Self {
        Self {
            capability,
            resize_filter: FilterType::Lanczos3,
        }
    }

    /// Filter used when the returned image has a different size
    pub fn with_resize_filter(mut self, filter: FilterType) -> Self {
        self.resize_filter = filter;
        self
    }

    pub fn capability(&self) -> &C {
        &self.capability
    }

    /// Run the effect on `frame`
    pub async fn apply(&self, frame: &Frame, instruction: &str) -> EffectResult {
        let request = EffectRequest::new(frame, instruction);

        match self.capability.generate(request).await {
            Ok(CapabilityResponse::Image(bytes)) => match self.decode_replacement(&bytes, frame) {
                Ok(replacement) => EffectResult::Replaced(replacement),
                Err(fault) => {
                    warn!("Error processing frame: {}", fault);
                    EffectResult::Unchanged(UnchangedReason::Fault(fault.to_string()))
                }
            },
            Ok(CapabilityResponse::NoImage { text }) => {
                match text {
                    Some(text) => info!(
                        "No image data found in response, returning original frame. Text response: {}",
                        preview(&text)
                    ),
                    None => info!("No image data found in response, returning original frame"),
                }
                EffectResult::Unchanged(UnchangedReason::NoImage)
            }
            Err(fault) => {
                warn!("Error processing frame with {}: {}", self.capability.name(), fault);
                EffectResult::Unchanged(UnchangedReason::Fault(fault.to_string()))
            }
        }
    }

    /// Decode returned bytes and stretch them to the input size if needed
    fn decode_replacement(&self, bytes: &[u8], original: &Frame) -> Result<Frame, EffectFault> {
        let decoded = image::load_from_memory(bytes)
            .map_err(EffectFault::ImageDecode)?
            .to_rgb8();

        let (width, height) = original.dimensions();
        if decoded.dimensions() == (width, height) {
            return Ok(Frame::new(decoded));
        }

        debug!(
            "Resizing returned image from {}x{} to {}x{}",
            decoded.width(),
            decoded.height(),
            width,
            height
        );
        let resized = image::imageops::resize(&decoded, width, height, self.resize_filter);
        Ok(Frame::new(resized))
    }
}

fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(50).collect();
    if text.chars().count() > 50 {
        preview.push_str("...");
    }
    preview
}
