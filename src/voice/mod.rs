//! Voice output
//!
//! TTS backends, the speech gateway that chooses between them, the speech
//! session state machine, and audio playback to the speakers.

mod gateway;
mod playback;
mod session;
mod tts;

pub use gateway::{SpeechGateway, SpeechReport};
pub use playback::{AudioSink, AudioSource, CpalSink, PlaybackControl, PlaybackHandle, decode_mp3};
pub use session::{Completion, PlaybackOutcome, SessionState, SpeechBackend, SpeechSession};
pub use tts::{
    ElevenLabsTts, FreeTts, GoogleTranslateTts, PrimaryTts, sanitize_for_speech, translate_tts_url,
};
