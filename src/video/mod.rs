//! # Video Module
//!
//! Frame types, sampling of source videos, and re-encoding of processed
//! frames. Decoding and container writing sit behind the [`VideoDecoder`] and
//! [`ContainerWriter`] traits; [`FfmpegBackend`] implements both.

pub mod types;
pub mod sampler;
pub mod encoder;
pub mod ffmpeg;

pub use types::{ChannelOrder, Frame, FrameSequence, RawFrame};
pub use sampler::{FrameSampler, FrameSource, SamplingPlan, VideoDecoder};
pub use encoder::{
    CodecCandidate, ContainerWriter, EncodeOutcome, EncodedVideo, FrameEncoder, FrameSink, StreamSpec,
};
pub use ffmpeg::{FfmpegBackend, StreamInfo};
