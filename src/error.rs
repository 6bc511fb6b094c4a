//! Error types for the translation pipeline

use thiserror::Error;

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Asr,
    Mt,
    Tts,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Asr => write!(f, "asr"),
            Stage::Mt => write!(f, "mt"),
            Stage::Tts => write!(f, "tts"),
        }
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// Violation of the session protocol (malformed frame, audio before
    /// config, sample-rate mismatch). Session-fatal: the endpoint emits one
    /// `error` event and closes the stream.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A single ASR/MT/TTS call failed. Transient: reported per segment,
    /// the pipeline keeps running.
    #[error("{stage} stage error: {message}")]
    Stage {
        stage: Stage,
        message: String,
        segment_id: Option<u64>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl Error {
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }

    pub fn stage(stage: Stage, message: impl Into<String>, segment_id: Option<u64>) -> Self {
        Error::Stage {
            stage,
            message: message.into(),
            segment_id,
        }
    }

    /// Whether this error must terminate the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Config(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
