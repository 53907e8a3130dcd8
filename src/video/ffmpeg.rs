// Decoding and encoding through the external ffmpeg/ffprobe executables.
//
// Frames travel as packed bgr24 over the child's stdio, so nothing here links
// against libav.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::OnceLock;
use std::thread::{self, JoinHandle};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::FfmpegConfig;
use crate::error::{EncodingError, SamplingError};
use crate::video::encoder::{CodecCandidate, ContainerWriter, FrameSink, StreamSpec};
use crate::video::sampler::{FrameSource, VideoDecoder};
use crate::video::types::{ChannelOrder, RawFrame};

/// Bytes of ffmpeg diagnostics kept for error messages
const STDERR_TAIL: usize = 4096;

/// Pixel layout used on the pipes in both directions
const PIPE_ORDER: ChannelOrder = ChannelOrder::Bgr;

/// Properties of the first video stream in a container
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    codec_name: Option<String>,
}

/// Parse an ffprobe rational like `30000/1001`; `0/0` means unknown
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((num, den)) => (num.trim().parse::<f64>().ok()?, den.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    let fps = num / den;
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

fn parse_probe(json: &str) -> Option<StreamInfo> {
    let output: ProbeOutput = serde_json::from_str(json).ok()?;
    let stream = output.streams.into_iter().next()?;
    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))?;

    Some(StreamInfo {
        width: stream.width?,
        height: stream.height?,
        fps,
        codec: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
    })
}

/// Encoder names from `ffmpeg -encoders` output
fn parse_encoder_list(listing: &str) -> Vec<String> {
    // Entries look like " V....D libx264    libx264 H.264 / AVC ..."
    listing
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let flags = fields.next()?;
            let name = fields.next()?;
            (flags.len() == 6 && flags.starts_with('V') && name != "=").then(|| name.to_string())
        })
        .collect()
}

/// Output pixel format; 4:2:0 needs even dimensions
fn output_pix_fmt(stream: &StreamSpec) -> &'static str {
    if stream.width % 2 == 0 && stream.height % 2 == 0 {
        "yuv420p"
    } else {
        "yuv444p"
    }
}

/// Map a 0-100 quality to the encoder's own rate-control arguments
fn quality_args(encoder: &str, quality: u8) -> Vec<String> {
    let q = quality.min(100) as f32 / 100.0;
    match encoder {
        "libx264" | "libx265" => {
            let crf = (51.0 - q * 51.0).round() as u8;
            vec!["-crf".into(), crf.to_string()]
        }
        "libvpx-vp9" => {
            let crf = (63.0 - q * 63.0).round() as u8;
            vec!["-crf".into(), crf.to_string(), "-b:v".into(), "0".into()]
        }
        _ => {
            // mpeg4 style qscale: 2 (best) .. 31 (worst)
            let qscale = (31.0 - q * 29.0).round() as u8;
            vec!["-q:v".into(), qscale.to_string()]
        }
    }
}

/// Read exactly one frame, `Ok(false)` on a clean end of stream
fn read_frame_bytes(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    if filled == 0 {
        return Ok(false);
    }
    if filled < buf.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("truncated frame: got {} of {} bytes", filled, buf.len()),
        ));
    }
    Ok(true)
}

/// Continuously read a child's stderr, keeping the last [`STDERR_TAIL`] bytes
///
/// The pipe must be drained while frames stream; a full stderr buffer would
/// block ffmpeg and, with it, the frame pipe.
fn spawn_stderr_reader<R: Read + Send + 'static>(mut stderr: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut tail: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match stderr.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    tail.extend_from_slice(&chunk[..n]);
                    if tail.len() > STDERR_TAIL {
                        let excess = tail.len() - STDERR_TAIL;
                        tail.drain(..excess);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&tail).trim().to_string()
    })
}

/// Collected stderr; only call once the child has exited
fn stderr_message(reader: Option<JoinHandle<String>>) -> String {
    reader.and_then(|handle| handle.join().ok()).unwrap_or_default()
}

fn reap(child: &mut Child) {
    if let Ok(None) = child.try_wait() {
        let _ = child.kill();
    }
    let _ = child.wait();
}

/// Video decoding and encoding via the ffmpeg command line tools
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    quality: u8,
    threads: usize,
    encoders: OnceLock<Vec<String>>,
}

impl FfmpegBackend {
    pub fn new(config: &FfmpegConfig, quality: u8, threads: usize) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            quality,
            threads,
            encoders: OnceLock::new(),
        }
    }

    /// Check whether the configured ffmpeg binary runs
    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Read size, rate and codec of the first video stream
    pub fn probe(&self, path: &Path) -> Result<StreamInfo, SamplingError> {
        let unavailable = |reason: String| SamplingError::SourceUnavailable {
            path: path.display().to_string(),
            reason,
        };

        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-select_streams", "v:0", "-show_streams", "-print_format", "json"])
            .arg(path)
            .output()
            .map_err(|e| unavailable(format!("could not run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(unavailable(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        let info = parse_probe(&json)
            .ok_or_else(|| unavailable("no decodable video stream found".to_string()))?;

        info!(
            "Video metadata: {}x{} @ {:.3}fps ({})",
            info.width, info.height, info.fps, info.codec
        );
        Ok(info)
    }

    fn available_encoders(&self) -> &[String] {
        self.encoders.get_or_init(|| {
            match Command::new(&self.ffmpeg).args(["-hide_banner", "-encoders"]).output() {
                Ok(output) if output.status.success() => {
                    let encoders = parse_encoder_list(&String::from_utf8_lossy(&output.stdout));
                    debug!("ffmpeg reports {} video encoders", encoders.len());
                    encoders
                }
                Ok(output) => {
                    warn!("ffmpeg -encoders failed: {}", String::from_utf8_lossy(&output.stderr).trim());
                    Vec::new()
                }
                Err(e) => {
                    warn!("Could not run ffmpeg: {}", e);
                    Vec::new()
                }
            }
        })
    }
}

impl VideoDecoder for FfmpegBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, SamplingError> {
        let info = self.probe(path)?;

        let mut child = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-noautorotate", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-vsync", "0", "-f", "rawvideo", "-pix_fmt"])
            .arg(PIPE_ORDER.ffmpeg_pix_fmt())
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SamplingError::SourceUnavailable {
                path: path.display().to_string(),
                reason: format!("could not start ffmpeg: {}", e),
            })?;

        let Some(stdout) = child.stdout.take() else {
            reap(&mut child);
            return Err(SamplingError::DecodeFailed {
                reason: "failed to capture ffmpeg stdout".to_string(),
            });
        };
        let stderr = child.stderr.take().map(spawn_stderr_reader);

        Ok(Box::new(FfmpegSource {
            child,
            stdout,
            stderr,
            info,
            done: false,
        }))
    }
}

impl ContainerWriter for FfmpegBackend {
    fn native_order(&self) -> ChannelOrder {
        PIPE_ORDER
    }

    fn open(
        &self,
        path: &Path,
        codec: &CodecCandidate,
        stream: &StreamSpec,
    ) -> Result<Box<dyn FrameSink>, EncodingError> {
        if !self.available_encoders().iter().any(|name| *name == codec.encoder) {
            return Err(EncodingError::WriteFailed {
                reason: format!("encoder '{}' is not available in this ffmpeg build", codec.encoder),
            });
        }

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", PIPE_ORDER.ffmpeg_pix_fmt()])
            .arg("-s")
            .arg(format!("{}x{}", stream.width, stream.height))
            .arg("-framerate")
            .arg(stream.fps.to_string())
            .args(["-i", "-", "-an", "-c:v"])
            .arg(&codec.encoder)
            .args(["-pix_fmt", output_pix_fmt(stream)])
            .args(quality_args(&codec.encoder, self.quality))
            .arg("-threads")
            .arg(self.threads.to_string())
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| EncodingError::WriteFailed {
            reason: format!("could not start ffmpeg: {}", e),
        })?;

        let Some(stdin) = child.stdin.take() else {
            reap(&mut child);
            return Err(EncodingError::WriteFailed {
                reason: "failed to capture ffmpeg stdin".to_string(),
            });
        };
        let stderr = child.stderr.take().map(spawn_stderr_reader);

        Ok(Box::new(FfmpegSink {
            child,
            stdin: Some(stdin),
            stderr,
            frame_len: RawFrame::byte_len(stream.width, stream.height),
            done: false,
        }))
    }
}

/// Decoding ffmpeg child streaming raw frames on stdout
struct FfmpegSource {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    info: StreamInfo,
    done: bool,
}

impl FrameSource for FfmpegSource {
    fn native_fps(&self) -> f64 {
        self.info.fps
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, SamplingError> {
        if self.done {
            return Ok(None);
        }

        let mut data = vec![0u8; RawFrame::byte_len(self.info.width, self.info.height)];
        let got_frame = read_frame_bytes(&mut self.stdout, &mut data).map_err(|e| {
            SamplingError::DecodeFailed {
                reason: e.to_string(),
            }
        })?;

        if got_frame {
            return Ok(Some(RawFrame {
                width: self.info.width,
                height: self.info.height,
                order: PIPE_ORDER,
                data,
            }));
        }

        self.done = true;
        let status = self.child.wait().map_err(|e| SamplingError::DecodeFailed {
            reason: format!("waiting for ffmpeg: {}", e),
        })?;
        if !status.success() {
            return Err(SamplingError::DecodeFailed {
                reason: format!("ffmpeg exited with {}: {}", status, stderr_message(self.stderr.take())),
            });
        }
        Ok(None)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if !self.done {
            reap(&mut self.child);
        }
    }
}

/// Encoding ffmpeg child reading raw frames on stdin
struct FfmpegSink {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frame_len: usize,
    done: bool,
}

impl FfmpegSink {
    fn failure(&mut self, context: &str, err: impl std::fmt::Display) -> EncodingError {
        // ffmpeg usually explains a broken pipe on stderr
        self.stdin = None;
        let _ = self.child.wait();
        self.done = true;
        let stderr = stderr_message(self.stderr.take());
        EncodingError::WriteFailed {
            reason: if stderr.is_empty() {
                format!("{}: {}", context, err)
            } else {
                format!("{}: {} ({})", context, err, stderr)
            },
        }
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &RawFrame) -> Result<(), EncodingError> {
        if frame.data.len() != self.frame_len || frame.order != PIPE_ORDER {
            return Err(EncodingError::WriteFailed {
                reason: format!(
                    "frame of {} bytes ({:?}) does not match the opened stream",
                    frame.data.len(),
                    frame.order
                ),
            });
        }

        let result = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(&frame.data),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "encoder already closed")),
        };
        result.map_err(|e| self.failure("writing frame", e))
    }

    fn finish(mut self: Box<Self>) -> Result<(), EncodingError> {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.flush() {
                return Err(self.failure("flushing frames", e));
            }
        }

        let status = self.child.wait().map_err(|e| EncodingError::WriteFailed {
            reason: format!("waiting for ffmpeg: {}", e),
        })?;
        self.done = true;

        if !status.success() {
            return Err(EncodingError::WriteFailed {
                reason: format!("ffmpeg exited with {}: {}", status, stderr_message(self.stderr.take())),
            });
        }
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if !self.done {
            self.stdin = None;
            reap(&mut self.child);
        }
    }
}
