//! Screen Companion - an on-screen character that comments on what you do
//!
//! This library provides the orchestration core of the companion:
//! - The ambient loop (capture, analyze, reveal, speak)
//! - Chat that preempts the loop
//! - Speech with a primary TTS backend and a free fallback
//! - Character selection and the shared commentary log
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Surfaces                          │
//! │        Console  │  Overlay window  │  ...            │
//! └────────────────────┬────────────────────────────────┘
//!                      │ text / thinking / status
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Orchestrator                        │
//! │  Loop  │  Chat  │  Perception  │  Commentary log     │
//! └───────┬───────────────────────────────┬─────────────┘
//!         │                               │
//! ┌───────▼──────────────┐   ┌────────────▼────────────┐
//! │  Capture │  Gemini   │   │  Speech gateway         │
//! │                      │   │  ElevenLabs → fallback  │
//! └──────────────────────┘   └─────────────────────────┘
//! ```

pub mod capture;
pub mod character;
pub mod commentary;
pub mod config;
pub mod daemon;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod perception;
pub mod prompt;
pub mod surface;
pub mod voice;

pub use capture::{CommandCapture, ScreenCapture, Screenshot};
pub use character::{CharacterProfile, CharacterRoster, builtin_characters};
pub use commentary::{CommentaryLog, MAX_UTTERANCE_CHARS, Utterance, UtteranceSource};
pub use config::{Config, LoadOptions, TimingConfig};
pub use daemon::{ControlCommand, Daemon};
pub use error::{Error, Result};
pub use model::{ChatCompleter, GeminiClient, VisionAnalyzer};
pub use orchestrator::{ChatOutcome, Components, Orchestrator, RunState};
pub use perception::Perception;
pub use surface::{ConsoleSurface, Surface};
pub use voice::{SpeechGateway, SpeechReport};
