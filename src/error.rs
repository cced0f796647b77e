//! Error types for the companion

use std::time::Duration;

use thiserror::Error;

/// Result type alias for companion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the companion
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Character not found in the roster
    #[error("character not found: {0}")]
    CharacterNotFound(String),

    /// Screen capture failed
    #[error("capture error: {0}")]
    Capture(String),

    /// Vision or chat model failure (network, API, empty response)
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Audio resource could not be opened for playback
    #[error("playback init error: {0}")]
    PlaybackInit(String),

    /// Playback did not signal completion before its deadline
    #[error("playback timed out after {0:?}")]
    PlaybackTimeout(Duration),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

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
}

impl Error {
    /// Whether this error ends a cycle early (capture or analysis failure)
    #[must_use]
    pub const fn is_cycle_error(&self) -> bool {
        matches!(self, Self::Capture(_) | Self::Analysis(_))
    }

    /// Short message suitable for the in-place status line
    #[must_use]
    pub fn status_message(&self) -> String {
        format!("Error: {self}")
    }
}
