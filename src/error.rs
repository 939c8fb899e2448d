//! Error types for the voxloop turn pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for voxloop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a conversation turn
///
/// A transcript that is too short to act on is not an error: it surfaces as
/// [`crate::TurnResult::Rejected`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credential, bad value). Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Capture device unavailable or busy
    #[error("audio device error: {0}")]
    Device(String),

    /// Audio could not be converted (resampling)
    #[error("audio processing error: {0}")]
    Audio(String),

    /// Speech-to-text backend failed
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Completion service call failed (network, auth, quota)
    #[error("completion service error: {0}")]
    Service(String),

    /// Speech engine failed to render
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Speech engine returned but the output file never appeared
    #[error("synthesis timed out: {} missing after {attempts} checks", path.display())]
    SynthesisTimeout { path: PathBuf, attempts: u32 },

    /// No conversation session with this id
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encoding/decoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}
