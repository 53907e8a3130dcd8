//! In-memory stand-ins for the decoder, container writer, effect capability
//! and progress sink, shared by the unit tests.

use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::ImageOutputFormat;

use crate::effects::{CapabilityResponse, EffectCapability, EffectRequest};
use crate::error::{EffectFault, EncodingError, SamplingError};
use crate::pipeline::{FrameOutcome, PipelineState, ProgressSink};
use crate::video::{
    ChannelOrder, CodecCandidate, ContainerWriter, Frame, FrameSink, FrameSource, RawFrame,
    StreamSpec, VideoDecoder,
};

const WIDTH: u32 = 4;
const HEIGHT: u32 = 2;

/// Pixel color carrying a frame number: red = low byte, green = high byte
fn tag_color(tag: usize) -> [u8; 3] {
    [(tag & 0xff) as u8, ((tag >> 8) & 0xff) as u8, 200]
}

/// Read back the number written by [`tag_color`]
pub fn frame_tag(frame: &Frame) -> usize {
    let [r, g, _] = frame.get_pixel(0, 0);
    r as usize + ((g as usize) << 8)
}

pub fn png_bytes(frame: &Frame) -> Vec<u8> {
    let mut bytes = Vec::new();
    frame
        .as_image()
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

/// Decoder producing `frames` BGR frames tagged with their index
pub struct FakeDecoder {
    fps: f64,
    frames: usize,
    fail_at: Option<usize>,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl FakeDecoder {
    pub fn new(fps: f64, frames: usize) -> Self {
        Self {
            fps,
            frames,
            fail_at: None,
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Report a decode error instead of frame `index`
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn open_count(&self) -> Arc<AtomicUsize> {
        self.opened.clone()
    }

    pub fn release_count(&self) -> Arc<AtomicUsize> {
        self.released.clone()
    }
}

impl VideoDecoder for FakeDecoder {
    fn open(&self, _path: &Path) -> Result<Box<dyn FrameSource>, SamplingError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSource {
            fps: self.fps,
            frames: self.frames,
            fail_at: self.fail_at,
            next: 0,
            released: self.released.clone(),
        }))
    }
}

struct FakeSource {
    fps: f64,
    frames: usize,
    fail_at: Option<usize>,
    next: usize,
    released: Arc<AtomicUsize>,
}

impl FrameSource for FakeSource {
    fn native_fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, SamplingError> {
        if self.fail_at == Some(self.next) {
            return Err(SamplingError::DecodeFailed {
                reason: format!("corrupt packet at frame {}", self.next),
            });
        }
        if self.next >= self.frames {
            return Ok(None);
        }

        let [r, g, b] = tag_color(self.next);
        self.next += 1;
        Ok(Some(RawFrame {
            width: WIDTH,
            height: HEIGHT,
            order: ChannelOrder::Bgr,
            data: [b, g, r].repeat((WIDTH * HEIGHT) as usize),
        }))
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Container writer recording everything it is given
#[derive(Default)]
pub struct FakeWriter {
    rejected: Vec<String>,
    fail_write_at: Option<usize>,
    create_file: bool,
    opened: Arc<Mutex<Vec<String>>>,
    paths: Arc<Mutex<Vec<PathBuf>>>,
    written: Arc<Mutex<Vec<RawFrame>>>,
    stream: Arc<Mutex<Option<StreamSpec>>>,
    finished: Arc<AtomicBool>,
}

impl FakeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make these encoders fail to open
    pub fn rejecting(mut self, encoders: &[&str]) -> Self {
        self.rejected = encoders.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn failing_write_at(mut self, index: usize) -> Self {
        self.fail_write_at = Some(index);
        self
    }

    /// Create the output file on open, like a real muxer would
    pub fn creating_file(mut self) -> Self {
        self.create_file = true;
        self
    }

    pub fn opened(&self) -> Arc<Mutex<Vec<String>>> {
        self.opened.clone()
    }

    /// Paths of successfully opened containers
    pub fn paths(&self) -> Arc<Mutex<Vec<PathBuf>>> {
        self.paths.clone()
    }

    pub fn written(&self) -> Arc<Mutex<Vec<RawFrame>>> {
        self.written.clone()
    }

    pub fn stream(&self) -> Arc<Mutex<Option<StreamSpec>>> {
        self.stream.clone()
    }

    pub fn finished(&self) -> Arc<AtomicBool> {
        self.finished.clone()
    }
}

impl ContainerWriter for FakeWriter {
    fn native_order(&self) -> ChannelOrder {
        ChannelOrder::Bgr
    }

    fn open(
        &self,
        path: &Path,
        codec: &CodecCandidate,
        stream: &StreamSpec,
    ) -> Result<Box<dyn FrameSink>, EncodingError> {
        self.opened.lock().unwrap().push(codec.encoder.clone());
        if self.rejected.contains(&codec.encoder) {
            return Err(EncodingError::WriteFailed {
                reason: format!("{} rejected", codec.encoder),
            });
        }

        if self.create_file {
            File::create(path).map_err(|e| EncodingError::WriteFailed { reason: e.to_string() })?;
        }
        *self.stream.lock().unwrap() = Some(*stream);
        self.paths.lock().unwrap().push(path.to_path_buf());

        Ok(Box::new(FakeSink {
            written: self.written.clone(),
            finished: self.finished.clone(),
            fail_write_at: self.fail_write_at,
            count: 0,
        }))
    }
}

struct FakeSink {
    written: Arc<Mutex<Vec<RawFrame>>>,
    finished: Arc<AtomicBool>,
    fail_write_at: Option<usize>,
    count: usize,
}

impl FrameSink for FakeSink {
    fn write_frame(&mut self, frame: &RawFrame) -> Result<(), EncodingError> {
        if self.fail_write_at == Some(self.count) {
            return Err(EncodingError::WriteFailed {
                reason: "disk full".to_string(),
            });
        }
        self.count += 1;
        self.written.lock().unwrap().push(frame.clone());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), EncodingError> {
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Capability that always faults
#[derive(Default)]
pub struct FailingCapability {
    calls: Arc<AtomicUsize>,
}

impl FailingCapability {
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl EffectCapability for FailingCapability {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _request: EffectRequest<'_>) -> Result<CapabilityResponse, EffectFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EffectFault::Api {
            status: 429,
            message: "Quota exceeded".to_string(),
        })
    }
}

/// Capability returning the same response every time
pub struct FixedCapability {
    response: CapabilityResponse,
}

impl FixedCapability {
    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            response: CapabilityResponse::Image(bytes),
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            response: CapabilityResponse::NoImage {
                text: Some(text.to_string()),
            },
        }
    }
}

impl EffectCapability for FixedCapability {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn generate(&self, _request: EffectRequest<'_>) -> Result<CapabilityResponse, EffectFault> {
        Ok(self.response.clone())
    }
}

/// Capability answering call `n` with a frame tagged `1000 + n`
///
/// Records the tag of every input frame it receives.
#[derive(Default)]
pub struct TaggingCapability {
    calls: AtomicUsize,
    seen: Arc<Mutex<Vec<usize>>>,
}

impl TaggingCapability {
    pub fn seen(&self) -> Arc<Mutex<Vec<usize>>> {
        self.seen.clone()
    }
}

impl EffectCapability for TaggingCapability {
    fn name(&self) -> &str {
        "tagging"
    }

    async fn generate(&self, request: EffectRequest<'_>) -> Result<CapabilityResponse, EffectFault> {
        self.seen.lock().unwrap().push(frame_tag(request.frame));
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let (width, height) = request.frame.dimensions();
        let reply = Frame::new_filled(width, height, tag_color(1000 + call));
        Ok(CapabilityResponse::Image(png_bytes(&reply)))
    }
}

/// Progress sink remembering every notification
#[derive(Default)]
pub struct RecordingProgress {
    stages: Arc<Mutex<Vec<PipelineState>>>,
    frames: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl RecordingProgress {
    pub fn stages(&self) -> Arc<Mutex<Vec<PipelineState>>> {
        self.stages.clone()
    }

    pub fn frames(&self) -> Arc<Mutex<Vec<(usize, usize)>>> {
        self.frames.clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_stage(&self, state: PipelineState) {
        self.stages.lock().unwrap().push(state);
    }

    fn on_frame(&self, done: usize, total: usize, _outcome: FrameOutcome) {
        self.frames.lock().unwrap().push((done, total));
    }
}
