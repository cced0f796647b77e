//! Speech gateway: backend choice, fallback, and the single session slot

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::playback::{AudioSink, AudioSource};
use super::session::{PlaybackOutcome, SessionState, SpeechBackend, SpeechSession};
use super::tts::{FreeTts, PrimaryTts, sanitize_for_speech};
use crate::character::CharacterProfile;
use crate::{Error, Result};

/// What happened to a `speak` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechReport {
    /// Audio was played (to completion or not)
    Played {
        backend: SpeechBackend,
        outcome: PlaybackOutcome,
    },
    /// Cancelled before any audio started
    Cancelled,
    /// Nothing could be spoken; the text stays display-only
    Silent,
}

/// Turns text into exactly one playing session at a time
pub struct SpeechGateway {
    primary: Option<Arc<dyn PrimaryTts>>,
    free: Arc<dyn FreeTts>,
    sink: Arc<dyn AudioSink>,
    slot: Mutex<Option<SpeechSession>>,
    next_id: AtomicU64,
    playback_timeout: Duration,
}

impl SpeechGateway {
    #[must_use]
    pub fn new(
        primary: Option<Arc<dyn PrimaryTts>>,
        free: Arc<dyn FreeTts>,
        sink: Arc<dyn AudioSink>,
        playback_timeout: Duration,
    ) -> Self {
        Self {
            primary,
            free,
            sink,
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
            playback_timeout,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<SpeechSession>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Speak `text` in `character`'s voice and wait until playback ends
    ///
    /// Never fails: every error degrades to a [`SpeechReport`]. If `cancel`
    /// fires, no new audio starts and any playing audio is abandoned.
    pub async fn speak(
        &self,
        text: &str,
        character: &CharacterProfile,
        cancel: &CancellationToken,
    ) -> SpeechReport {
        let text = sanitize_for_speech(text);
        if text.is_empty() {
            tracing::debug!("nothing speakable after sanitizing");
            return SpeechReport::Silent;
        }

        if let Some(report) = self.try_primary(&text, character, cancel).await {
            return report;
        }

        let source = match self.free.synthesize(&text).await {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(error = %e, "fallback TTS failed, staying silent");
                return SpeechReport::Silent;
            }
        };

        if cancel.is_cancelled() {
            return SpeechReport::Cancelled;
        }

        match self.play(SpeechBackend::Fallback, source, cancel).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "fallback playback failed, staying silent");
                SpeechReport::Silent
            }
        }
    }

    /// Attempt the primary backend; `None` means fall back
    async fn try_primary(
        &self,
        text: &str,
        character: &CharacterProfile,
        cancel: &CancellationToken,
    ) -> Option<SpeechReport> {
        let primary = self.primary.as_ref()?;
        if !character.has_remote_voice() {
            tracing::debug!(character = %character.id, "no remote voice, using fallback");
            return None;
        }
        let voice_id = character.voice_id.as_deref()?;

        let audio = match primary.synthesize(text, voice_id).await {
            Ok(Some(audio)) if !audio.is_empty() => audio,
            Ok(_) => {
                tracing::info!(voice_id, "primary TTS returned no audio, falling back");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, voice_id, "primary TTS failed, falling back");
                return None;
            }
        };

        if cancel.is_cancelled() {
            return Some(SpeechReport::Cancelled);
        }

        match self
            .play(SpeechBackend::Primary, AudioSource::Mp3(audio), cancel)
            .await
        {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "primary playback failed, falling back");
                None
            }
        }
    }

    /// Replace the active session with a new one and wait for it
    async fn play(
        &self,
        backend: SpeechBackend,
        source: AudioSource,
        cancel: &CancellationToken,
    ) -> Result<SpeechReport> {
        let (id, completion) = {
            let mut slot = self.slot();
            if let Some(mut previous) = slot.take() {
                tracing::debug!(session = previous.id(), "stopping previous session");
                previous.stop();
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let mut session = SpeechSession::new(id, backend);
            let completion = session.start(self.sink.as_ref(), source)?;
            *slot = Some(session);
            (id, completion)
        };

        tracing::info!(session = id, %backend, "speaking");

        let deadline = Instant::now() + self.playback_timeout;
        let outcome = tokio::select! {
            outcome = completion.wait(deadline) => outcome,
            () = cancel.cancelled() => PlaybackOutcome::Stopped,
        };

        if outcome == PlaybackOutcome::TimedOut {
            tracing::warn!(
                session = id,
                error = %Error::PlaybackTimeout(self.playback_timeout),
                "forcing session disposal"
            );
        }

        self.finish(id, outcome);
        Ok(SpeechReport::Played { backend, outcome })
    }

    /// Dispose session `id` if it still occupies the slot
    fn finish(&self, id: u64, outcome: PlaybackOutcome) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|s| s.id() == id)
            && let Some(mut session) = slot.take()
        {
            session.finish(outcome);
            tracing::debug!(session = id, ?outcome, "session finished");
        }
    }

    /// Force-stop the active session, if any
    pub fn stop(&self) {
        let session = self.slot().take();
        if let Some(mut session) = session {
            tracing::debug!(session = session.id(), "force stopping session");
            session.stop();
        }
    }

    /// Whether a session is currently playing
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|s| s.state() == SessionState::Playing)
    }

    /// Backend of the playing session
    #[must_use]
    pub fn active_backend(&self) -> Option<SpeechBackend> {
        self.slot().as_ref().map(SpeechSession::backend)
    }

    #[must_use]
    pub const fn playback_timeout(&self) -> Duration {
        self.playback_timeout
    }
}

impl std::fmt::Debug for SpeechGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechGateway")
            .field("has_primary", &self.primary.is_some())
            .field("playback_timeout", &self.playback_timeout)
            .finish_non_exhaustive()
    }
}
