//! Daemon - the companion process
//!
//! Wires configuration into the orchestrator's collaborators, starts the
//! ambient loop, and turns lines on stdin into control commands or chat.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::capture::{CommandCapture, ScreenCapture};
use crate::model::GeminiClient;
use crate::orchestrator::{ChatOutcome, Components, Orchestrator};
use crate::perception::Perception;
use crate::surface::{ConsoleSurface, Surface};
use crate::voice::{AudioSink, CpalSink, ElevenLabsTts, GoogleTranslateTts, PrimaryTts, SpeechGateway};
use crate::{Config, Result};

/// A line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    /// Switch to the character with this id
    Character(String),
    /// List known characters
    Characters,
    /// Print the commentary log
    History,
    Quit,
    /// Anything else is a chat message (possibly empty)
    Chat(String),
}

impl ControlCommand {
    /// Interpret one line of input
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (command, arg) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(c, a)| (c, a.trim()));

        match command {
            "/pause" => Self::Pause,
            "/resume" => Self::Resume,
            "/character" if !arg.is_empty() => Self::Character(arg.to_string()),
            "/character" | "/characters" => Self::Characters,
            "/history" => Self::History,
            "/quit" | "/exit" => Self::Quit,
            _ => Self::Chat(line.to_string()),
        }
    }
}

/// The companion daemon
pub struct Daemon {
    orchestrator: Orchestrator,
}

impl Daemon {
    /// Build every collaborator from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the Gemini key is missing, the capture command is
    /// invalid, or the character roster is invalid
    pub fn new(config: &Config) -> Result<Self> {
        let gemini_key = config.api_keys.gemini.clone().unwrap_or_default();
        let gemini = Arc::new(GeminiClient::new(gemini_key)?.with_model(config.model.clone()));
        tracing::info!(model = %config.model, "model client initialized");

        let capture: Arc<dyn ScreenCapture> = match &config.capture_command {
            Some(argv) => Arc::new(CommandCapture::new(argv.clone())?),
            None => Arc::new(CommandCapture::platform_default()),
        };

        let surface: Arc<dyn Surface> = Arc::new(ConsoleSurface::new());

        let orchestrator = Orchestrator::new(Components {
            capture,
            perception: Perception::new(gemini.clone(), gemini),
            speech: build_speech_gateway(config),
            surface,
            roster: config.roster()?,
            timing: config.timing,
        });

        Ok(Self { orchestrator })
    }

    /// Run until interrupted or told to quit
    ///
    /// # Errors
    ///
    /// Returns error if reading stdin fails
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        let character = self.orchestrator.roster().current();
        tracing::info!(character = %character.name, "companion running");
        self.orchestrator.start();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                line = lines.next_line(), if stdin_open => match line? {
                    Some(line) => {
                        if !self.handle(ControlCommand::parse(&line)) {
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("stdin closed, running until interrupted");
                        stdin_open = false;
                    }
                },
            }
        }

        self.orchestrator.stop();
        tracing::info!("companion stopped");
        Ok(())
    }

    /// Apply one command; returns `false` to quit
    fn handle(&self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::Pause => {
                self.orchestrator.pause();
                println!("\n[paused]");
            }
            ControlCommand::Resume => {
                if !self.orchestrator.resume() {
                    println!("\n[already running]");
                }
            }
            ControlCommand::Character(id) => match self.orchestrator.select_character(&id) {
                Ok(profile) => println!("\n[now: {}]", profile.name),
                Err(e) => println!("\n{}", e.status_message()),
            },
            ControlCommand::Characters => {
                let current = self.orchestrator.roster().current();
                for profile in self.orchestrator.roster().profiles() {
                    let marker = if profile.id == current.id { "*" } else { " " };
                    println!("{marker} {} ({})", profile.id, profile.name);
                }
            }
            ControlCommand::History => {
                println!("\n{}", self.orchestrator.log().joined());
            }
            ControlCommand::Quit => return false,
            ControlCommand::Chat(message) => {
                let orchestrator = self.orchestrator.clone();
                tokio::spawn(async move {
                    match orchestrator.submit(&message).await {
                        ChatOutcome::Replied(text) => tracing::debug!(%text, "chat replied"),
                        ChatOutcome::Failed(e) => tracing::debug!(error = %e, "chat failed"),
                        outcome => tracing::debug!(?outcome, "chat finished"),
                    }
                });
            }
        }
        true
    }
}

/// Build the speech gateway, or `None` if voice is off or unavailable
pub fn build_speech_gateway(config: &Config) -> Option<SpeechGateway> {
    if !config.voice.enabled {
        tracing::info!("voice disabled, commentary is display-only");
        return None;
    }

    let sink: Arc<dyn AudioSink> = match CpalSink::new() {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            tracing::warn!(error = %e, "no audio output, commentary is display-only");
            return None;
        }
    };

    let primary = config.api_keys.elevenlabs.clone().and_then(|key| {
        let tts = match &config.voice.elevenlabs_model {
            Some(model) => ElevenLabsTts::with_model(key, model.clone()),
            None => ElevenLabsTts::new(key),
        };
        match tts {
            Ok(tts) => Some(Arc::new(tts) as Arc<dyn PrimaryTts>),
            Err(e) => {
                tracing::warn!(error = %e, "primary TTS unavailable");
                None
            }
        }
    });
    if primary.is_none() {
        tracing::info!("no ElevenLabs key, using fallback TTS only");
    }

    let free = Arc::new(GoogleTranslateTts::new(config.voice.language.clone()));
    Some(SpeechGateway::new(
        primary,
        free,
        sink,
        config.timing.playback_timeout,
    ))
}
