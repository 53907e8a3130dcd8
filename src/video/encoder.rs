use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::EncodingError;
use crate::video::types::{ChannelOrder, FrameSequence, RawFrame};

/// One output codec to try, by encoder identifier and display label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecCandidate {
    /// Encoder identifier understood by the container writer (e.g. `libx264`)
    pub encoder: String,

    /// Human readable name used in logs
    pub label: String,
}

impl CodecCandidate {
    pub fn new<E: Into<String>, L: Into<String>>(encoder: E, label: L) -> Self {
        Self {
            encoder: encoder.into(),
            label: label.into(),
        }
    }

    /// Most broadly playable first
    pub fn default_priority() -> Vec<CodecCandidate> {
        vec![
            CodecCandidate::new("libx264", "H.264"),
            CodecCandidate::new("libvpx-vp9", "VP9"),
            CodecCandidate::new("mpeg4", "MPEG-4"),
        ]
    }
}

/// Geometry and timing of the stream being written
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSpec {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// An output container accepting frames in the writer's native order
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RawFrame) -> Result<(), EncodingError>;

    /// Flush and close the container
    fn finish(self: Box<Self>) -> Result<(), EncodingError>;
}

/// Opens output containers for a given codec
///
/// `open` doubles as the capability probe for a codec: an error means the
/// candidate is not usable and the next one should be tried.
pub trait ContainerWriter: Send + Sync {
    /// Channel order the sinks expect
    fn native_order(&self) -> ChannelOrder;

    fn open(
        &self,
        path: &Path,
        codec: &CodecCandidate,
        stream: &StreamSpec,
    ) -> Result<Box<dyn FrameSink>, EncodingError>;
}

/// Represents an encoded video output
#[derive(Debug, Clone)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub codec: CodecCandidate,
    pub frame_count: usize,
    pub fps: f64,
    pub file_size: u64,
}

/// What the encoder did with a sequence
#[derive(Debug, Clone)]
pub enum EncodeOutcome {
    Written(EncodedVideo),

    /// The sequence was empty; no container was opened
    NothingWritten,
}

/// Writes frame sequences into a video container
#[derive(Clone)]
pub struct FrameEncoder {
    writer: Arc<dyn ContainerWriter>,
    candidates: Vec<CodecCandidate>,
}

impl FrameEncoder {
    /// Create an encoder using the default codec priority
    pub fn new(writer: Arc<dyn ContainerWriter>) -> Self {
        Self::with_candidates(writer, CodecCandidate::default_priority())
    }

    pub fn with_candidates(writer: Arc<dyn ContainerWriter>, candidates: Vec<CodecCandidate>) -> Self {
        Self { writer, candidates }
    }

    pub fn candidates(&self) -> &[CodecCandidate] {
        &self.candidates
    }

    /// Encode `sequence` to `output_path`, consuming it
    ///
    /// Frames are written to a staging file in the same directory, which
    /// replaces `output_path` only once the container is finalized. On any
    /// failure `output_path` is left exactly as it was.
    ///
    /// An empty sequence is not an error: it yields
    /// [`EncodeOutcome::NothingWritten`] and callers must check for it.
    pub fn encode(
        &self,
        sequence: FrameSequence,
        output_path: &Path,
    ) -> Result<EncodeOutcome, EncodingError> {
        let Some((width, height)) = sequence.dimensions() else {
            warn!("No frames to write, skipping {:?}", output_path);
            return Ok(EncodeOutcome::NothingWritten);
        };

        let stream = StreamSpec {
            width,
            height,
            fps: sequence.effective_fps(),
        };
        let staging = Self::staging_file(output_path)?;
        let (codec, mut sink) = self.open_first_available(staging.path(), output_path, &stream)?;
        info!(
            "Initialized writer with codec: {} ('{}'), {}x{} @ {} fps",
            codec.label, codec.encoder, width, height, stream.fps
        );

        let order = self.writer.native_order();
        let written = sequence
            .iter()
            .try_for_each(|frame| sink.write_frame(&frame.to_raw(order)));

        // Finalize even when a write failed so the process/file is released
        let finished = sink.finish();
        written.and(finished)?;

        staging.persist(output_path).map_err(|e| EncodingError::WriteFailed {
            reason: format!("could not move encoded video into place: {}", e.error),
        })?;

        let file_size = std::fs::metadata(output_path).map(|m| m.len()).unwrap_or(0);
        info!("Video saved to {:?} ({} frames, {} bytes)", output_path, sequence.len(), file_size);

        Ok(EncodeOutcome::Written(EncodedVideo {
            path: output_path.to_path_buf(),
            codec: codec.clone(),
            frame_count: sequence.len(),
            fps: stream.fps,
            file_size,
        }))
    }

    /// Hidden file next to `output_path` with the same extension
    ///
    /// The extension is kept so the container format can be inferred from it.
    /// The file is deleted on drop unless persisted.
    fn staging_file(output_path: &Path) -> Result<NamedTempFile, EncodingError> {
        let dir = output_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let suffix = output_path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        tempfile::Builder::new()
            .prefix(".video-fx-")
            .suffix(&suffix)
            .tempfile_in(dir)
            .map_err(|e| EncodingError::WriteFailed {
                reason: format!("could not create staging file in {:?}: {}", dir, e),
            })
    }

    fn open_first_available(
        &self,
        staging_path: &Path,
        output_path: &Path,
        stream: &StreamSpec,
    ) -> Result<(&CodecCandidate, Box<dyn FrameSink>), EncodingError> {
        for codec in &self.candidates {
            match self.writer.open(staging_path, codec, stream) {
                Ok(sink) => return Ok((codec, sink)),
                Err(e) => debug!("Codec {} ('{}') unavailable: {}", codec.label, codec.encoder, e),
            }
        }

        Err(EncodingError::EncoderUnavailable {
            path: output_path.display().to_string(),
            tried: self.candidates.iter().map(|c| c.encoder.clone()).collect(),
        })
    }
}
