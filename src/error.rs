use thiserror::Error;

/// Main error type for the video-fx library
///
/// Only failures at the read (sampling) and write (encoding) boundaries are
/// fatal to a run. Per-frame effect faults never surface here; see
/// [`EffectFault`].
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Sampling error: {0}")]
    Sampling(#[from] SamplingError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Errors raised while decoding and sampling the source video
#[derive(Error, Debug)]
pub enum SamplingError {
    #[error("Source video unavailable: {path} ({reason})")]
    SourceUnavailable { path: String, reason: String },

    #[error("Video decoding failed: {reason}")]
    DecodeFailed { reason: String },

    #[error("Frame {index} is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    InconsistentDimensions {
        index: usize,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// Errors raised while writing the output container
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("No codec could be opened for {path} (tried: {})", tried.join(", "))]
    EncoderUnavailable { path: String, tried: Vec<String> },

    #[error("Frame sequence is empty, nothing to encode")]
    EmptySequence,

    #[error("Video encoding failed: {reason}")]
    WriteFailed { reason: String },
}

/// Faults from the external per-frame effect capability
///
/// These are absorbed by the effect applier and turned into pass-through
/// frames. They are public so capability implementations can report them.
#[derive(Error, Debug)]
pub enum EffectFault {
    #[error("API key is not set (expected in ${env_var})")]
    MissingApiKey { env_var: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Could not decode returned image: {0}")]
    ImageDecode(image::ImageError),

    #[error("Could not encode frame for upload: {0}")]
    ImageEncode(image::ImageError),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path} ({reason})")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// True when the run failed while reading the source
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Self::Sampling(_))
    }

    /// True when the run failed while writing the output
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Self::Encoding(_))
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Sampling(SamplingError::SourceUnavailable { path, .. }) => {
                format!("Could not read input video '{}'. Please check the file exists and is a decodable video.", path)
            }
            Self::Sampling(err) => format!("Reading the input video failed: {}", err),
            Self::Encoding(EncodingError::EncoderUnavailable { path, tried }) => {
                format!(
                    "Could not write output video '{}': none of the codecs [{}] are available in your ffmpeg build.",
                    path,
                    tried.join(", ")
                )
            }
            Self::Encoding(EncodingError::EmptySequence) => {
                "No frames were extracted from the input, so no output video was written.".to_string()
            }
            Self::Encoding(err) => format!("Writing the output video failed: {}", err),
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
