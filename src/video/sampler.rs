use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::SamplingError;
use crate::video::types::{Frame, FrameSequence, RawFrame};

/// An open, forward-only stream of decoded frames
///
/// Dropping the source releases the underlying handle.
pub trait FrameSource {
    /// Nominal frame rate reported by the container
    fn native_fps(&self) -> f64;

    /// Decode the next frame, or `Ok(None)` once the stream is exhausted
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SamplingError>;
}

/// Opens video files for decoding
pub trait VideoDecoder: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, SamplingError>;
}

/// Which source frames to keep and what rate to report for them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPlan {
    /// Keep frames at positions `0, step, 2*step, ...`
    pub step: usize,

    /// Playback rate of the kept frames
    pub effective_fps: f64,
}

impl SamplingPlan {
    /// Work out the stride for a requested rate
    ///
    /// The stride is `round(native / target)` clamped to at least 1, and the
    /// requested rate is reported as-is. For ratios that are not whole numbers
    /// the real spacing of kept frames differs slightly from the requested
    /// rate; this nearest-stride approximation is intentional.
    pub fn new(native_fps: f64, target_fps: Option<f64>) -> Self {
        match target_fps {
            Some(target) if target < native_fps => {
                let step = (native_fps / target).round().max(1.0) as usize;
                Self {
                    step,
                    effective_fps: target,
                }
            }
            Some(target) => {
                if target > native_fps {
                    warn!(
                        "Target FPS {} is higher than video FPS {}, capturing all frames",
                        target, native_fps
                    );
                }
                Self::every_frame(native_fps)
            }
            None => Self::every_frame(native_fps),
        }
    }

    fn every_frame(native_fps: f64) -> Self {
        Self {
            step: 1,
            effective_fps: native_fps,
        }
    }

    /// Whether the source frame at zero-based `index` is kept
    pub fn keeps(&self, index: usize) -> bool {
        index % self.step == 0
    }
}

/// Decodes a video and keeps a regular subsequence of its frames
#[derive(Clone)]
pub struct FrameSampler {
    decoder: Arc<dyn VideoDecoder>,
    target_fps: Option<f64>,
    max_frames: Option<usize>,
}

impl FrameSampler {
    /// Create a sampler that keeps every frame at the native rate
    pub fn new(decoder: Arc<dyn VideoDecoder>) -> Self {
        Self {
            decoder,
            target_fps: None,
            max_frames: None,
        }
    }

    /// Sample at the given rate instead of the native one
    ///
    /// Non-positive or non-finite rates are ignored.
    pub fn with_target_fps(mut self, target_fps: Option<f64>) -> Self {
        self.target_fps = target_fps.filter(|fps| fps.is_finite() && *fps > 0.0);
        self
    }

    /// Stop once this many frames have been kept
    pub fn with_max_frames(mut self, max_frames: Option<usize>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn target_fps(&self) -> Option<f64> {
        self.target_fps
    }

    /// Decode `path` and return the sampled frames in RGB order
    ///
    /// Nothing partial is returned: any decode error discards the frames
    /// collected so far.
    pub fn sample(&self, path: &Path) -> Result<FrameSequence, SamplingError> {
        if !path.exists() {
            return Err(SamplingError::SourceUnavailable {
                path: path.display().to_string(),
                reason: "file does not exist".to_string(),
            });
        }

        let mut source = self.decoder.open(path)?;
        let native_fps = source.native_fps();
        if !native_fps.is_finite() || native_fps <= 0.0 {
            return Err(SamplingError::SourceUnavailable {
                path: path.display().to_string(),
                reason: format!("could not determine frame rate (got {})", native_fps),
            });
        }

        let plan = SamplingPlan::new(native_fps, self.target_fps);
        if plan.step > 1 {
            info!(
                "Extracting 1 frame every {} frames (target FPS: {})",
                plan.step, plan.effective_fps
            );
        }

        let mut sequence = FrameSequence::new(plan.effective_fps);
        let mut index = 0usize;

        while let Some(raw) = source.next_frame()? {
            if plan.keeps(index) {
                let frame = Frame::from_raw(raw).ok_or_else(|| SamplingError::DecodeFailed {
                    reason: format!("frame {} has a buffer that does not match its size", index),
                })?;
                sequence.push(frame)?;

                if self.max_frames.is_some_and(|max| sequence.len() >= max) {
                    debug!("Reached frame limit of {}, stopping decode", sequence.len());
                    break;
                }
            }
            index += 1;
        }

        info!(
            "Sampled {} of {} decoded frames at {} fps (native {} fps)",
            sequence.len(),
            index,
            sequence.effective_fps(),
            native_fps
        );
        Ok(sequence)
    }
}
