//! Text-to-speech (TTS) backends
//!
//! The primary backend is a remote voice service selected per character; the
//! free backend needs no key and is always tried last.

use async_trait::async_trait;

use super::playback::AudioSource;
use crate::{Error, Result};

const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const DEFAULT_ELEVENLABS_MODEL: &str = "eleven_multilingual_v2";
const GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Remote TTS keyed by a voice identifier
#[async_trait]
pub trait PrimaryTts: Send + Sync {
    /// Synthesize `text` with `voice_id`
    ///
    /// `Ok(None)` means the service produced no audio; callers fall back.
    ///
    /// # Errors
    ///
    /// Returns error on transport or API failure
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Option<Vec<u8>>>;
}

/// Keyless TTS used as the last resort
#[async_trait]
pub trait FreeTts: Send + Sync {
    /// Synthesize `text` into playable audio
    ///
    /// # Errors
    ///
    /// Returns error on transport failure
    async fn synthesize(&self, text: &str) -> Result<AudioSource>;
}

/// Strip non-ASCII and control characters and collapse whitespace
///
/// Text passes through this before it is embedded in any backend request.
#[must_use]
pub fn sanitize_for_speech(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii() && (!c.is_ascii_control() || c.is_ascii_whitespace()))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `ElevenLabs` text-to-speech
pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl ElevenLabsTts {
    /// Create a new `ElevenLabs` backend
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_model(api_key, DEFAULT_ELEVENLABS_MODEL.to_string())
    }

    /// Create a new `ElevenLabs` backend with a custom model
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn with_model(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl PrimaryTts for ElevenLabsTts {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Option<Vec<u8>>> {
        #[derive(serde::Serialize)]
        struct VoiceSettings {
            stability: f32,
            similarity_boost: f32,
        }

        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
            voice_settings: VoiceSettings,
        }

        let url = format!("{ELEVENLABS_API_URL}/{}", urlencoding::encode(voice_id));

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.5,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Ok(None);
        }

        tracing::debug!(bytes = audio.len(), voice_id, "ElevenLabs audio received");
        Ok(Some(audio.to_vec()))
    }
}

/// Google Translate's unofficial speech endpoint
pub struct GoogleTranslateTts {
    client: reqwest::Client,
    language: String,
}

impl GoogleTranslateTts {
    #[must_use]
    pub fn new(language: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            language,
        }
    }
}

/// Build the `translate_tts` URL for already-sanitized text
#[must_use]
pub fn translate_tts_url(text: &str, language: &str) -> String {
    format!(
        "{GOOGLE_TTS_URL}?ie=UTF-8&client=tw-ob&tl={}&q={}",
        urlencoding::encode(language),
        urlencoding::encode(text)
    )
}

#[async_trait]
impl FreeTts for GoogleTranslateTts {
    async fn synthesize(&self, text: &str) -> Result<AudioSource> {
        let url = translate_tts_url(&sanitize_for_speech(text), &self.language);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Tts(format!("Google TTS error {status}")));
        }

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), "Google TTS audio received");
        Ok(AudioSource::Mp3(audio.to_vec()))
    }
}
