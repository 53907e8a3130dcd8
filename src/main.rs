use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use video_fx::{
    config::Config,
    effects::{FrameEffectApplier, GeminiCapability, ModelRegistry},
    pipeline::{PipelineOrchestrator, TracingProgress},
    prompt::PromptTemplate,
    video::{FfmpegBackend, FrameEncoder, FrameSampler},
};

#[derive(Parser)]
#[command(
    name = "video-fx",
    version,
    about = "Apply generative image effects to the frames of a video",
    long_about = "video-fx extracts frames from a video at a reduced rate, sends each one with an instruction to an image model, and reassembles the returned frames into a new video. Frames the model cannot process are kept as they were."
)]
struct Cli {
    /// Input video file
    input: PathBuf,

    /// Output video file (defaults to <input>_fx.mp4)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frames per second to extract
    #[arg(long, conflicts_with = "all_frames")]
    fps: Option<f64>,

    /// Keep every frame at the source rate
    #[arg(long)]
    all_frames: bool,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<usize>,

    /// Model alias (pro, flash) or model identifier
    #[arg(short, long)]
    model: Option<String>,

    /// Prompt template file
    #[arg(long, conflicts_with = "prompt")]
    prompt_file: Option<PathBuf>,

    /// Inline instruction instead of a template file
    #[arg(short, long)]
    prompt: Option<String>,

    /// Template variable as key=value (repeatable)
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_var(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{}_fx.mp4", stem))
}

/// Fold command line overrides into the loaded configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if cli.all_frames {
        config.sampling.target_fps = None;
    } else if let Some(fps) = cli.fps {
        config.sampling.target_fps = Some(fps);
    }
    if cli.max_frames.is_some() {
        config.sampling.max_frames = cli.max_frames;
    }
    if let Some(model) = &cli.model {
        config.effect.model = model.clone();
    }
    if let Some(path) = &cli.prompt_file {
        config.prompt.template_path = path.clone();
    }
    config.prompt.variables.extend(cli.vars.iter().cloned());
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting video-fx v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    apply_overrides(&mut config, &cli);
    config.validate()?;

    if let Some(path) = &cli.dump_config {
        config.save_to_file(path)?;
        info!("Configuration written to {:?}", path);
        return Ok(());
    }

    // Build the instruction
    let template = match &cli.prompt {
        Some(text) => PromptTemplate::from_text(text.clone()),
        None => PromptTemplate::load(&config.prompt.template_path),
    };
    let variables: HashMap<String, String> = config.prompt.variables.clone();
    let instruction = template.render(&variables);
    info!("Using prompt: {}", instruction.chars().take(100).collect::<String>());

    // Assemble the pipeline
    let backend = Arc::new(FfmpegBackend::new(
        &config.ffmpeg,
        config.encoder.quality,
        config.encoder.threads,
    ));
    let sampler = FrameSampler::new(backend.clone())
        .with_target_fps(config.sampling.target_fps)
        .with_max_frames(config.sampling.max_frames);

    let model = ModelRegistry::resolve(&config.effect.model);
    let capability = GeminiCapability::new(&config.effect, model)?;
    let applier = FrameEffectApplier::new(capability);

    let encoder = FrameEncoder::with_candidates(backend, config.encoder.codecs.clone());

    let output = cli.output.clone().unwrap_or_else(|| default_output(&cli.input));
    let mut pipeline = PipelineOrchestrator::new(sampler, applier, encoder)
        .with_progress(Box::new(TracingProgress::default()));

    match pipeline.run(&cli.input, &output, &instruction).await {
        Ok(summary) => {
            println!("Output:   {}", summary.output.path.display());
            println!("Codec:    {}", summary.output.codec.label);
            println!("Frames:   {} at {} fps", summary.total_frames, summary.effective_fps);
            println!(
                "Replaced: {} (unchanged: {} without image, {} due to faults)",
                summary.replaced, summary.unchanged_no_image, summary.unchanged_due_to_faults()
            );
            println!("Elapsed:  {:.1}s", summary.elapsed_secs());
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            let stage = if e.is_read_failure() { "read" } else { "write" };
            anyhow::bail!("{} failure: {}", stage, e.user_message())
        }
    }
}
