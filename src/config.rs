use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    video::CodecCandidate,
};

/// Main configuration for video-fx
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame sampling settings
    pub sampling: SamplingConfig,

    /// Effect capability settings
    pub effect: EffectConfig,

    /// Instruction template settings
    pub prompt: PromptConfig,

    /// Output encoding settings
    pub encoder: EncoderConfig,

    /// Locations of the ffmpeg tools
    pub ffmpeg: FfmpegConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.sampling.validate()?;
        self.effect.validate()?;
        self.encoder.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Frame sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Frames per second to extract; unset keeps every frame
    pub target_fps: Option<f64>,

    /// Upper bound on extracted frames (keeps API usage predictable)
    pub max_frames: Option<usize>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            target_fps: Some(1.0),
            max_frames: None,
        }
    }
}

impl SamplingConfig {
    fn validate(&self) -> Result<()> {
        if let Some(fps) = self.target_fps {
            if !fps.is_finite() || fps <= 0.0 {
                return Err(invalid("sampling.target_fps", fps).into());
            }
        }

        if self.max_frames == Some(0) {
            return Err(invalid("sampling.max_frames", 0).into());
        }

        Ok(())
    }
}

/// Effect capability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Model alias (`pro`, `flash`, ...) or literal model identifier
    pub model: String,

    /// Base URL of the generative API
    pub endpoint: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            model: "pro".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl EffectConfig {
    fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(invalid("effect.model", &self.model).into());
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(invalid("effect.endpoint", &self.endpoint).into());
        }

        if self.request_timeout_secs == 0 {
            return Err(invalid("effect.request_timeout_secs", 0).into());
        }

        Ok(())
    }
}

/// Instruction template configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Template file with `{name}` placeholders
    pub template_path: PathBuf,

    /// Values substituted into the template
    pub variables: HashMap<String, String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("prompts/collage_prompt.txt"),
            variables: HashMap::new(),
        }
    }
}

/// Output encoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Quality setting (0-100, higher is better)
    pub quality: u8,

    /// Encoder threads
    pub threads: usize,

    /// Codecs to try, in priority order
    pub codecs: Vec<CodecCandidate>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: 85,
            threads: num_cpus::get(),
            codecs: CodecCandidate::default_priority(),
        }
    }
}

impl EncoderConfig {
    fn validate(&self) -> Result<()> {
        if self.codecs.is_empty() {
            return Err(invalid("encoder.codecs", "[]").into());
        }

        if self.quality > 100 {
            return Err(invalid("encoder.quality", self.quality).into());
        }

        if self.threads == 0 {
            return Err(invalid("encoder.threads", self.threads).into());
        }

        Ok(())
    }
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}
