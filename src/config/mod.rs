//! Configuration management
//!
//! Values resolve as CLI > env > TOML file > default.

pub mod file;

use std::time::Duration;

use crate::character::{CharacterProfile, CharacterRoster, builtin_characters};
use crate::{Error, Result};

use file::CompanionConfigFile;

/// Default pause between cycles
pub const DEFAULT_CYCLE_DELAY: Duration = Duration::from_secs(8);

/// Default per-character reveal delay
pub const DEFAULT_REVEAL_DELAY: Duration = Duration::from_millis(30);

/// Default delay before the loop resumes after a chat
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Default longest playback of a single utterance
pub const DEFAULT_PLAYBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Companion configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Character selected at start-up
    pub character: String,

    /// All known characters (built-ins first)
    pub characters: Vec<CharacterProfile>,

    /// Loop timing
    pub timing: TimingConfig,

    /// Gemini model identifier
    pub model: String,

    /// Voice output configuration
    pub voice: VoiceConfig,

    /// Screenshot command argv; `None` picks the platform default
    pub capture_command: Option<Vec<String>>,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Pause between cycles
    pub cycle_delay: Duration,

    /// Per-character delay of the text reveal
    pub reveal_delay: Duration,

    /// Delay before the loop resumes after a chat
    pub settle_delay: Duration,

    /// Longest a single utterance may play
    pub playback_timeout: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cycle_delay: DEFAULT_CYCLE_DELAY,
            reveal_delay: DEFAULT_REVEAL_DELAY,
            settle_delay: DEFAULT_SETTLE_DELAY,
            playback_timeout: DEFAULT_PLAYBACK_TIMEOUT,
        }
    }
}

/// Voice output configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Speak commentary aloud
    pub enabled: bool,

    /// Language code for the free TTS backend
    pub language: String,

    /// `ElevenLabs` model identifier; `None` uses the backend default
    pub elevenlabs_model: Option<String>,
}

/// API keys for external services
#[derive(Clone, Default)]
pub struct ApiKeys {
    /// Gemini API key (vision and chat)
    pub gemini: Option<String>,

    /// `ElevenLabs` API key (optional primary TTS)
    pub elevenlabs: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("gemini", &self.gemini.as_ref().map(|_| "<redacted>"))
            .field("elevenlabs", &self.elevenlabs.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Command-line overrides
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Character to start with
    pub character: Option<String>,

    /// Pause between cycles in milliseconds
    pub cycle_delay_ms: Option<u64>,

    /// Turn speech off
    pub disable_voice: bool,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load(options: &LoadOptions) -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, options, |key| std::env::var(key).ok())
    }

    /// Merge options, env (through `env`), and a parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if the character roster is invalid or the selected
    /// character does not exist
    pub fn resolve(
        fc: CompanionConfigFile,
        options: &LoadOptions,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env_ms = |key: &str| env(key).and_then(|v| v.parse::<u64>().ok());

        let character = options
            .character
            .clone()
            .or_else(|| env("COMPANION_CHARACTER"))
            .or(fc.character)
            .unwrap_or_else(|| "kangel".to_string());

        let mut characters = builtin_characters();
        characters.extend(fc.characters);

        let timing = TimingConfig {
            cycle_delay: options
                .cycle_delay_ms
                .or_else(|| env_ms("COMPANION_CYCLE_DELAY_MS"))
                .or(fc.timing.cycle_delay_ms)
                .map_or(DEFAULT_CYCLE_DELAY, Duration::from_millis),
            reveal_delay: fc
                .timing
                .reveal_delay_ms
                .map_or(DEFAULT_REVEAL_DELAY, Duration::from_millis),
            settle_delay: fc
                .timing
                .settle_delay_ms
                .map_or(DEFAULT_SETTLE_DELAY, Duration::from_millis),
            playback_timeout: fc
                .timing
                .playback_timeout_ms
                .map_or(DEFAULT_PLAYBACK_TIMEOUT, Duration::from_millis),
        };

        if timing.playback_timeout.is_zero() {
            return Err(Error::Config(
                "loop.playback_timeout_ms must be greater than zero".to_string(),
            ));
        }

        let model = env("COMPANION_MODEL")
            .or(fc.model.model)
            .unwrap_or_else(|| crate::model::DEFAULT_MODEL.to_string());

        let voice_enabled = if options.disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
            false
        } else {
            fc.voice.enabled.unwrap_or(true)
        };
        let voice = VoiceConfig {
            enabled: voice_enabled,
            language: fc.voice.language.unwrap_or_else(|| "en".to_string()),
            elevenlabs_model: fc.voice.elevenlabs_model,
        };

        let capture_command = env("COMPANION_CAPTURE_CMD")
            .map(|cmd| cmd.split_whitespace().map(ToString::to_string).collect())
            .or(fc.capture.command);

        let api_keys = ApiKeys {
            gemini: env("GEMINI_API_KEY").or(fc.api_keys.gemini),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
        };

        let config = Self {
            character,
            characters,
            timing,
            model,
            voice,
            capture_command,
            api_keys,
        };

        // Fail early on unknown characters or duplicate ids
        config.roster()?;
        Ok(config)
    }

    /// Build the character roster with the configured character current
    ///
    /// # Errors
    ///
    /// Returns error if the roster is invalid
    pub fn roster(&self) -> Result<CharacterRoster> {
        CharacterRoster::new(self.characters.clone(), &self.character)
    }
}
