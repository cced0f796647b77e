//! TOML configuration file loading
//!
//! Supports `~/.config/screen-companion/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::character::CharacterProfile;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct CompanionConfigFile {
    /// Character selected at start-up (e.g. "kangel")
    #[serde(default)]
    pub character: Option<String>,

    /// Loop timing
    #[serde(default, rename = "loop")]
    pub timing: LoopFileConfig,

    /// Vision/chat model configuration
    #[serde(default)]
    pub model: ModelFileConfig,

    /// Voice output configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Screen capture configuration
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Extra characters, added after the built-in ones
    #[serde(default)]
    pub characters: Vec<CharacterProfile>,
}

/// Loop timing, all in milliseconds
#[derive(Debug, Default, Deserialize)]
pub struct LoopFileConfig {
    /// Pause between cycles
    pub cycle_delay_ms: Option<u64>,

    /// Per-character delay of the text reveal
    pub reveal_delay_ms: Option<u64>,

    /// Delay before the loop resumes after a chat
    pub settle_delay_ms: Option<u64>,

    /// Longest a single utterance may play before it is force-stopped
    pub playback_timeout_ms: Option<u64>,
}

/// Model configuration
#[derive(Debug, Default, Deserialize)]
pub struct ModelFileConfig {
    /// Gemini model identifier (e.g. "gemini-2.5-flash")
    pub model: Option<String>,
}

/// Voice output configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Speak commentary aloud
    pub enabled: Option<bool>,

    /// Language code for the free TTS backend (e.g. "en")
    pub language: Option<String>,

    /// `ElevenLabs` model identifier
    pub elevenlabs_model: Option<String>,
}

/// Screen capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Screenshot command argv; must print an image to stdout
    pub command: Option<Vec<String>>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub gemini: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `CompanionConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> CompanionConfigFile {
    let path = std::env::var_os("COMPANION_CONFIG")
        .map(PathBuf::from)
        .or_else(config_file_path);

    match path {
        Some(path) => load_config_from(&path),
        None => CompanionConfigFile::default(),
    }
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_from(path: &Path) -> CompanionConfigFile {
    if !path.exists() {
        return CompanionConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                CompanionConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            CompanionConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/screen-companion/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("screen-companion")
            .join("config.toml")
    })
}
