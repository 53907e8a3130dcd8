use image::{ImageBuffer, Rgb, RgbImage};
use rayon::prelude::*;

use crate::error::SamplingError;

/// Byte order of the three color channels in a packed 8-bit pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

impl ChannelOrder {
    /// Name of the matching ffmpeg raw pixel format
    pub fn ffmpeg_pix_fmt(self) -> &'static str {
        match self {
            ChannelOrder::Rgb => "rgb24",
            ChannelOrder::Bgr => "bgr24",
        }
    }
}

/// A packed pixel buffer as produced or consumed by a video backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Number of bytes a packed 3-channel frame of this size occupies
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }
}

/// Swap the first and third channel of every pixel in place
fn swap_red_blue(data: &mut [u8]) {
    data.par_chunks_exact_mut(3).for_each(|px| px.swap(0, 2));
}

/// Represents a single video frame
///
/// This is a wrapper around an RGB image buffer. Width and height never
/// change after construction; effects replace whole frames instead.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_fn(width, height, |_, _| Rgb(color));
        Self { buffer }
    }

    /// Build a frame from a backend buffer, converting it to RGB order
    ///
    /// Returns `None` if the buffer length does not match the dimensions.
    pub fn from_raw(raw: RawFrame) -> Option<Self> {
        let RawFrame { width, height, order, mut data } = raw;
        if order == ChannelOrder::Bgr {
            swap_red_blue(&mut data);
        }
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }

    /// Copy the pixels out in the requested channel order
    pub fn to_raw(&self, order: ChannelOrder) -> RawFrame {
        let mut data = self.buffer.as_raw().clone();
        if order == ChannelOrder::Bgr {
            swap_red_blue(&mut data);
        }
        RawFrame {
            width: self.width(),
            height: self.height(),
            order,
            data,
        }
    }

    /// Get the width of the frame
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    /// Get the height of the frame
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Get the underlying image buffer
    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }
}

/// Ordered frames sharing one size, plus the rate they should play back at
///
/// The list can only grow while it is being built by the sampler. After that,
/// frames may be swapped one at a time but the sequence is never reordered
/// or resized.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<Frame>,
    effective_fps: f64,
}

impl FrameSequence {
    /// Create a new empty sequence
    pub fn new(effective_fps: f64) -> Self {
        Self {
            frames: Vec::new(),
            effective_fps,
        }
    }

    /// Append a frame, enforcing that it matches the size of the first one
    pub fn push(&mut self, frame: Frame) -> Result<(), SamplingError> {
        if let Some((expected_width, expected_height)) = self.dimensions() {
            if frame.dimensions() != (expected_width, expected_height) {
                return Err(SamplingError::InconsistentDimensions {
                    index: self.frames.len(),
                    expected_width,
                    expected_height,
                    actual_width: frame.width(),
                    actual_height: frame.height(),
                });
            }
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Swap the frame at `index`, returning the previous one
    ///
    /// Returns `None` (and leaves the sequence untouched) if the index is out
    /// of range or the replacement has a different size.
    pub fn replace(&mut self, index: usize, frame: Frame) -> Option<Frame> {
        let slot = self.frames.get_mut(index)?;
        if slot.dimensions() != frame.dimensions() {
            return None;
        }
        Some(std::mem::replace(slot, frame))
    }

    pub fn effective_fps(&self) -> f64 {
        self.effective_fps
    }

    /// Shared size of every frame, or `None` when empty
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.frames.first().map(Frame::dimensions)
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }
}
