use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::task;
use tracing::{error, info, warn};

use crate::{
    effects::{EffectCapability, EffectResult, FrameEffectApplier, UnchangedReason},
    error::{EncodingError, PipelineError, Result, SamplingError},
    pipeline::progress::{FrameOutcome, ProgressSink, TracingProgress},
    video::{EncodeOutcome, EncodedVideo, FrameEncoder, FrameSampler, FrameSequence},
};

/// Where a run currently is
///
/// `Failed` is only reachable from `Sampling` or `Encoding`; the effect
/// stage absorbs its own faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Sampling,
    Effecting,
    Encoding,
    Done,
    Failed,
}

impl PipelineState {
    pub(crate) fn icon(self) -> &'static str {
        match self {
            PipelineState::Idle => "⏸️",
            PipelineState::Sampling => "📹",
            PipelineState::Effecting => "✨",
            PipelineState::Encoding => "🎞️",
            PipelineState::Done => "🎉",
            PipelineState::Failed => "❌",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Idle => "Idle",
            PipelineState::Sampling => "Sampling frames",
            PipelineState::Effecting => "Applying effects",
            PipelineState::Encoding => "Encoding output",
            PipelineState::Done => "Done",
            PipelineState::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub input: PathBuf,
    pub output: EncodedVideo,
    pub effective_fps: f64,
    pub total_frames: usize,
    pub replaced: usize,
    pub unchanged_no_image: usize,
    pub unchanged_fault: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Frames that kept their original pixels because the capability failed
    pub fn unchanged_due_to_faults(&self) -> usize {
        self.unchanged_fault
    }

    /// Frames that kept their original pixels for any reason
    pub fn unchanged(&self) -> usize {
        self.unchanged_no_image + self.unchanged_fault
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

#[derive(Debug, Default)]
struct EffectTally {
    replaced: usize,
    no_image: usize,
    fault: usize,
}

/// Drives one video through sampling, effects and encoding
///
/// The pipeline follows a fixed sequence:
/// 1. Sampling - decode the input and keep frames at the target rate
/// 2. Effecting - run every frame through the effect applier, in order
/// 3. Encoding - write the frames at the sampled rate
///
/// Frames are processed one at a time and the sequence is owned by the
/// orchestrator for the whole run.
pub struct PipelineOrchestrator<C> {
    sampler: FrameSampler,
    applier: FrameEffectApplier<C>,
    encoder: FrameEncoder,
    progress: Box<dyn ProgressSink>,
    state: PipelineState,
}

impl<C: EffectCapability> PipelineOrchestrator<C> {
    pub fn new(sampler: FrameSampler, applier: FrameEffectApplier<C>, encoder: FrameEncoder) -> Self {
        Self {
            sampler,
            applier,
            encoder,
            progress: Box::new(TracingProgress::default()),
            state: PipelineState::Idle,
        }
    }

    /// Replace the default tracing progress reporter
    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run the whole pipeline on `input`, writing to `output`
    ///
    /// Returns an error only for sampling or encoding failures; in both
    /// cases `output` is left as it was.
    pub async fn run(&mut self, input: &Path, output: &Path, instruction: &str) -> Result<RunSummary> {
        let started_at = Utc::now();
        self.state = PipelineState::Idle;

        info!("🎬 Starting video effect pipeline");
        info!("   Input: {:?}", input);
        info!("   Output: {:?}", output);
        info!("   Effect: {}", self.applier.capability().name());

        // Pipeline Step 1: Sampling
        let mut sequence = match self.sample(input).await {
            Ok(sequence) => sequence,
            Err(e) => return Err(self.fail(e.into())),
        };

        // Pipeline Step 2: Effects
        let tally = self.apply_effects(&mut sequence, instruction).await;

        // Pipeline Step 3: Encoding
        let effective_fps = sequence.effective_fps();
        let total_frames = sequence.len();
        let encoded = match self.encode(sequence, output).await {
            Ok(encoded) => encoded,
            Err(e) => return Err(self.fail(e.into())),
        };

        self.transition(PipelineState::Done);

        let summary = RunSummary {
            input: input.to_path_buf(),
            output: encoded,
            effective_fps,
            total_frames,
            replaced: tally.replaced,
            unchanged_no_image: tally.no_image,
            unchanged_fault: tally.fault,
            started_at,
            finished_at: Utc::now(),
        };

        if summary.unchanged_fault > 0 {
            warn!(
                "{} of {} frames unchanged due to faults",
                summary.unchanged_fault, summary.total_frames
            );
        }
        info!(
            "Processing complete in {:.1}s. Output saved to {:?}",
            summary.elapsed_secs(),
            summary.output.path
        );
        Ok(summary)
    }

    fn transition(&mut self, next: PipelineState) {
        self.state = next;
        self.progress.on_stage(next);
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        error!("Pipeline failed during {}: {}", self.state, err);
        self.transition(PipelineState::Failed);
        err
    }

    // ==========================================
    // PIPELINE STEP 1: SAMPLING
    // ==========================================

    async fn sample(&mut self, input: &Path) -> std::result::Result<FrameSequence, SamplingError> {
        self.transition(PipelineState::Sampling);

        let sampler = self.sampler.clone();
        let input = input.to_path_buf();
        let sequence = task::spawn_blocking(move || sampler.sample(&input))
            .await
            .map_err(|e| SamplingError::DecodeFailed {
                reason: format!("sampling task failed: {}", e),
            })??;

        info!(
            "   Extracted {} frames. Processing video FPS at: {}",
            sequence.len(),
            sequence.effective_fps()
        );
        Ok(sequence)
    }

    // ==========================================
    // PIPELINE STEP 2: EFFECTS
    // ==========================================

    async fn apply_effects(&mut self, sequence: &mut FrameSequence, instruction: &str) -> EffectTally {
        self.transition(PipelineState::Effecting);

        let total = sequence.len();
        let mut tally = EffectTally::default();

        for index in 0..total {
            let result = match sequence.get(index) {
                Some(frame) => self.applier.apply(frame, instruction).await,
                None => break,
            };

            let outcome = match result {
                EffectResult::Replaced(frame) => match sequence.replace(index, frame) {
                    Some(_) => FrameOutcome::Replaced,
                    None => {
                        warn!("Replacement for frame {} has the wrong size, keeping original", index);
                        FrameOutcome::UnchangedFault
                    }
                },
                EffectResult::Unchanged(UnchangedReason::NoImage) => FrameOutcome::UnchangedNoImage,
                EffectResult::Unchanged(UnchangedReason::Fault(_)) => FrameOutcome::UnchangedFault,
            };

            match outcome {
                FrameOutcome::Replaced => tally.replaced += 1,
                FrameOutcome::UnchangedNoImage => tally.no_image += 1,
                FrameOutcome::UnchangedFault => tally.fault += 1,
            }
            self.progress.on_frame(index + 1, total, outcome);
        }

        info!(
            "   Effects applied: {} replaced, {} without image, {} faulted",
            tally.replaced, tally.no_image, tally.fault
        );
        tally
    }

    // ==========================================
    // PIPELINE STEP 3: ENCODING
    // ==========================================

    async fn encode(
        &mut self,
        sequence: FrameSequence,
        output: &Path,
    ) -> std::result::Result<EncodedVideo, EncodingError> {
        self.transition(PipelineState::Encoding);

        let encoder = self.encoder.clone();
        let output = output.to_path_buf();
        let outcome = task::spawn_blocking(move || encoder.encode(sequence, &output))
            .await
            .map_err(|e| EncodingError::WriteFailed {
                reason: format!("encoding task failed: {}", e),
            })??;

        match outcome {
            EncodeOutcome::Written(video) => Ok(video),
            EncodeOutcome::NothingWritten => Err(EncodingError::EmptySequence),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        frame_tag, FailingCapability, FakeDecoder, FakeWriter, FixedCapability, RecordingProgress,
        TaggingCapability,
    };
    use crate::pipeline::NoopProgress;
    use crate::video::{ChannelOrder, Frame};
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn orchestrator<C: EffectCapability>(
        decoder: FakeDecoder,
        writer: FakeWriter,
        capability: C,
        target_fps: Option<f64>,
    ) -> PipelineOrchestrator<C> {
        let sampler = FrameSampler::new(Arc::new(decoder)).with_target_fps(target_fps);
        let encoder = FrameEncoder::new(Arc::new(writer));
        PipelineOrchestrator::new(sampler, FrameEffectApplier::new(capability), encoder)
    }

    fn decode_written(writer_frames: &[crate::video::RawFrame]) -> Vec<Frame> {
        writer_frames
            .iter()
            .map(|raw| {
                assert_eq!(raw.order, ChannelOrder::Bgr);
                Frame::from_raw(raw.clone()).unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_ten_second_clip_at_one_fps() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let input = NamedTempFile::new().unwrap();
        let writer = FakeWriter::new();
        let written = writer.written();
        let stream = writer.stream();
        let mut pipeline = orchestrator(
            FakeDecoder::new(30.0, 300),
            writer,
            FixedCapability::text("no image today"),
            Some(1.0),
        )
        .with_progress(Box::new(NoopProgress));

        let summary = pipeline.run(input.path(), &output, "noop").await.unwrap();

        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(summary.total_frames, 10);
        assert_eq!(summary.effective_fps, 1.0);
        assert_eq!(summary.output.frame_count, 10);
        assert_eq!(summary.unchanged_no_image, 10);
        assert_eq!(summary.unchanged_due_to_faults(), 0);
        assert_eq!(written.lock().unwrap().len(), 10);
        assert_eq!(stream.lock().unwrap().map(|s| s.fps), Some(1.0));
    }

    #[tokio::test]
    async fn test_failing_capability_passes_frames_through() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let input = NamedTempFile::new().unwrap();
        let writer = FakeWriter::new();
        let written = writer.written();
        let mut pipeline = orchestrator(
            FakeDecoder::new(24.0, 48),
            writer,
            FailingCapability::default(),
            Some(6.0),
        );

        let summary = pipeline.run(input.path(), &output, "x").await.unwrap();
        assert_eq!(summary.total_frames, 12);
        assert_eq!(summary.unchanged_due_to_faults(), 12);
        assert_eq!(summary.replaced, 0);

        let expected = FrameSampler::new(Arc::new(FakeDecoder::new(24.0, 48)))
            .with_target_fps(Some(6.0))
            .sample(input.path())
            .unwrap();
        let frames = decode_written(&written.lock().unwrap());
        assert_eq!(frames, expected.frames());
    }

    #[tokio::test]
    async fn test_output_order_matches_sampling_order() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let input = NamedTempFile::new().unwrap();
        let writer = FakeWriter::new();
        let written = writer.written();
        let capability = TaggingCapability::default();
        let seen = capability.seen();
        let mut pipeline = orchestrator(FakeDecoder::new(30.0, 90), writer, capability, Some(5.0));

        let summary = pipeline.run(input.path(), &output, "tag").await.unwrap();
        assert_eq!(summary.replaced, 15);

        // The capability saw the sampled frames in source order...
        let expected_inputs: Vec<usize> = (0..90).step_by(6).collect();
        assert_eq!(*seen.lock().unwrap(), expected_inputs);

        // ...and its n-th answer landed at position n of the output
        let frames = decode_written(&written.lock().unwrap());
        let tags: Vec<usize> = frames.iter().map(frame_tag).collect();
        assert_eq!(tags, (1000..1015).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_missing_input_fails_in_sampling() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let writer = FakeWriter::new();
        let opened = writer.opened();
        let mut pipeline = orchestrator(
            FakeDecoder::new(30.0, 30),
            writer,
            FailingCapability::default(),
            None,
        );

        let err = pipeline
            .run(Path::new("/missing/input.mp4"), &output, "x")
            .await
            .unwrap_err();

        assert!(err.is_read_failure());
        assert!(matches!(err, PipelineError::Sampling(SamplingError::SourceUnavailable { .. })));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_source_fails_in_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let input = NamedTempFile::new().unwrap();
        let mut pipeline = orchestrator(
            FakeDecoder::new(30.0, 0),
            FakeWriter::new(),
            FailingCapability::default(),
            Some(1.0),
        );

        let err = pipeline.run(input.path(), &output, "x").await.unwrap_err();
        assert!(err.is_write_failure());
        assert!(matches!(err, PipelineError::Encoding(EncodingError::EmptySequence)));
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[tokio::test]
    async fn test_no_codec_fails_in_encoding_after_effects() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let input = NamedTempFile::new().unwrap();
        let capability = FailingCapability::default();
        let calls = capability.calls();
        let mut pipeline = orchestrator(
            FakeDecoder::new(10.0, 20),
            FakeWriter::new().rejecting(&["libx264", "libvpx-vp9", "mpeg4"]),
            capability,
            Some(5.0),
        );

        let err = pipeline.run(input.path(), &output, "x").await.unwrap_err();
        assert!(matches!(err, PipelineError::Encoding(EncodingError::EncoderUnavailable { .. })));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_progress_reports_stages_and_frames() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let input = NamedTempFile::new().unwrap();
        let progress = RecordingProgress::default();
        let stages = progress.stages();
        let frames = progress.frames();
        let mut pipeline = orchestrator(
            FakeDecoder::new(10.0, 30),
            FakeWriter::new(),
            FailingCapability::default(),
            Some(2.0),
        )
        .with_progress(Box::new(progress));

        pipeline.run(input.path(), &output, "x").await.unwrap();

        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                PipelineState::Sampling,
                PipelineState::Effecting,
                PipelineState::Encoding,
                PipelineState::Done
            ]
        );
        let frames = frames.lock().unwrap();
        let done: Vec<usize> = frames.iter().map(|(done, _)| *done).collect();
        assert_eq!(done, vec![1, 2, 3, 4, 5, 6]);
        assert!(frames.iter().all(|(_, total)| *total == 6));
    }
}
