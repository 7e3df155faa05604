//! Error handling for consensus-crowd
//!
//! Record-scoped failures (bad input fields, speech service errors, export
//! errors) are recoverable: the batch driver skips the affected record or
//! output and keeps going. Nothing in the layering or mixing math can fail
//! once its inputs have been parsed.

use thiserror::Error;

use crate::speech::Stance;

/// Result type alias for crowd operations
pub type Result<T> = std::result::Result<T, CrowdError>;

/// Main error type for crowd synthesis operations
#[derive(Error, Debug)]
pub enum CrowdError {
    // Input Errors
    #[error("Row {row}: invalid {field} '{value}': {reason}")]
    InputParse {
        row: usize,
        field: String,
        value: String,
        reason: String,
    },

    #[error("Input table not readable: {reason}")]
    MissingInput {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // Speech Errors
    #[error("Speech synthesis failed for {stance} utterance: {reason}")]
    SynthesisService {
        stance: Stance,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Audio Errors
    #[error("Invalid audio: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio format mismatch: expected {expected}, found {found}")]
    FormatMismatch { expected: String, found: String },

    #[error("Failed to encode {path}: {reason}")]
    Encoding { path: String, reason: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CrowdError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            CrowdError::InputParse { .. } => "INPUT_PARSE",
            CrowdError::MissingInput { .. } => "MISSING_INPUT",
            CrowdError::FileNotFound { .. } => "FILE_NOT_FOUND",
            CrowdError::SynthesisService { .. } => "SYNTHESIS_SERVICE",
            CrowdError::InvalidAudio { .. } => "INVALID_AUDIO",
            CrowdError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            CrowdError::FormatMismatch { .. } => "FORMAT_MISMATCH",
            CrowdError::Encoding { .. } => "ENCODING",
            CrowdError::Config { .. } => "CONFIG",
            CrowdError::Io(_) => "IO_ERROR",
            CrowdError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the batch can continue past this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CrowdError::InputParse { .. }
                | CrowdError::SynthesisService { .. }
                | CrowdError::Encoding { .. }
                | CrowdError::InvalidAudio { .. }
                | CrowdError::FormatMismatch { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            CrowdError::InputParse { .. } => vec![
                "Percent fields must be numbers between 0 and 100",
                "Check the row for stray quotes or missing columns",
            ],
            CrowdError::MissingInput { .. } => vec![
                "Check the input path is correct",
                "The table needs the columns issue, statement, scientific_consensus, public_agreement",
            ],
            CrowdError::SynthesisService { .. } => vec![
                "Check the speech service is reachable (CROWD_TTS_URL)",
                "Retry the run; cached utterances are reused",
                "Use the offline whisper voice with --speech whisper",
            ],
            CrowdError::UnsupportedFormat { .. } => vec![
                "Convert the file to 16-bit or 24-bit PCM WAV",
                "Supported export bit depths: 16, 24, 32",
            ],
            CrowdError::FormatMismatch { .. } => vec![
                "Conform both buffers to the same sample rate and channel layout first",
            ],
            CrowdError::Encoding { .. } => vec![
                "Check the output directory is writable",
                "Free up disk space",
            ],
            CrowdError::Config { .. } => vec![
                "Run with --help to see valid ranges",
                "Remove the config file to fall back to defaults",
            ],
            _ => vec![],
        }
    }
}
