//! Speech session: one utterance's playback from start to disposal
//!
//! ```text
//! Idle ──start──▶ Playing ──finish──▶ Stopped | TimedOut ──▶ Disposed
//!   └──────────────────┴───────stop────────────────────────────▲
//! ```
//!
//! `Disposed` is terminal and reachable from every state through `stop`.

use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::playback::{AudioSink, AudioSource, PlaybackControl};
use crate::{Error, Result};

/// Which TTS backend produced the audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechBackend {
    /// Remote voice service keyed by the character's voice id
    Primary,
    /// Free backend used when the primary is unavailable or unsuitable
    Fallback,
}

impl std::fmt::Display for SpeechBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Playing,
    Stopped,
    TimedOut,
    Disposed,
}

/// How waiting on a playing session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Audio reached its natural end
    Finished,
    /// Session was stopped externally
    Stopped,
    /// Deadline passed without a completion signal
    TimedOut,
}

/// A single playable utterance owning at most one audio handle
pub struct SpeechSession {
    id: u64,
    backend: SpeechBackend,
    state: SessionState,
    control: Option<Box<dyn PlaybackControl>>,
    stopped: CancellationToken,
}

impl SpeechSession {
    #[must_use]
    pub fn new(id: u64, backend: SpeechBackend) -> Self {
        Self {
            id,
            backend,
            state: SessionState::Idle,
            control: None,
            stopped: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn backend(&self) -> SpeechBackend {
        self.backend
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Open `source` on `sink` and move to `Playing`
    ///
    /// On failure the session is disposed.
    ///
    /// # Errors
    ///
    /// Returns `Error::PlaybackInit` if the session was already started or the
    /// audio resource cannot be opened
    pub fn start(&mut self, sink: &dyn AudioSink, source: AudioSource) -> Result<Completion> {
        if self.state != SessionState::Idle {
            return Err(Error::PlaybackInit(format!(
                "session {} already {:?}",
                self.id, self.state
            )));
        }

        match sink.play(source) {
            Ok(handle) => {
                let (finished, control) = handle.into_parts();
                self.control = Some(control);
                self.state = SessionState::Playing;
                tracing::debug!(session = self.id, backend = %self.backend, "session playing");

                Ok(Completion {
                    finished,
                    stopped: self.stopped.clone(),
                })
            }
            Err(e) => {
                self.dispose();
                Err(match e {
                    Error::PlaybackInit(_) => e,
                    other => Error::PlaybackInit(other.to_string()),
                })
            }
        }
    }

    /// Record how playback ended and dispose
    pub fn finish(&mut self, outcome: PlaybackOutcome) {
        if self.state == SessionState::Playing {
            self.state = match outcome {
                PlaybackOutcome::TimedOut => SessionState::TimedOut,
                PlaybackOutcome::Finished | PlaybackOutcome::Stopped => SessionState::Stopped,
            };
        }
        self.dispose();
    }

    /// Stop playback and release the audio resource
    ///
    /// Idempotent and safe from any state; always ends in `Disposed`.
    pub fn stop(&mut self) {
        if self.state == SessionState::Disposed {
            return;
        }
        if self.state == SessionState::Playing {
            self.state = SessionState::Stopped;
        }
        self.dispose();
    }

    fn dispose(&mut self) {
        if let Some(mut control) = self.control.take() {
            control.halt();
        }
        self.stopped.cancel();

        if self.state != SessionState::Disposed {
            tracing::debug!(session = self.id, from = ?self.state, "session disposed");
            self.state = SessionState::Disposed;
        }
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SpeechSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSession")
            .field("id", &self.id)
            .field("backend", &self.backend)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Observes the end of a started session
#[derive(Debug)]
pub struct Completion {
    finished: oneshot::Receiver<()>,
    stopped: CancellationToken,
}

impl Completion {
    /// Wait for natural completion, a stop request, or `deadline`
    pub async fn wait(self, deadline: Instant) -> PlaybackOutcome {
        let Self { finished, stopped } = self;

        tokio::select! {
            biased;
            () = stopped.cancelled() => PlaybackOutcome::Stopped,
            result = finished => match result {
                Ok(()) => PlaybackOutcome::Finished,
                // Sender dropped without signalling: playback was halted
                Err(_) => PlaybackOutcome::Stopped,
            },
            () = tokio::time::sleep_until(deadline) => PlaybackOutcome::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::voice::PlaybackHandle;

    /// Sink whose playbacks finish only when told to
    #[derive(Default)]
    struct ManualSink {
        halts: Arc<AtomicUsize>,
        finishers: Mutex<Vec<oneshot::Sender<()>>>,
        fail: bool,
    }

    struct CountingControl(Arc<AtomicUsize>);

    impl PlaybackControl for CountingControl {
        fn halt(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl AudioSink for ManualSink {
        fn play(&self, _source: AudioSource) -> Result<PlaybackHandle> {
            if self.fail {
                return Err(Error::Audio("device busy".to_string()));
            }
            let (tx, rx) = oneshot::channel();
            self.finishers.lock().unwrap().push(tx);
            Ok(PlaybackHandle::new(
                rx,
                Box::new(CountingControl(Arc::clone(&self.halts))),
            ))
        }
    }

    fn clip() -> AudioSource {
        AudioSource::Mp3(vec![1, 2, 3])
    }

    #[test]
    fn test_stop_from_every_state_disposes() {
        let sink = ManualSink::default();

        let mut idle = SpeechSession::new(1, SpeechBackend::Fallback);
        idle.stop();
        assert_eq!(idle.state(), SessionState::Disposed);

        let mut playing = SpeechSession::new(2, SpeechBackend::Primary);
        playing.start(&sink, clip()).unwrap();
        assert_eq!(playing.state(), SessionState::Playing);
        playing.stop();
        assert_eq!(playing.state(), SessionState::Disposed);

        let mut finished = SpeechSession::new(3, SpeechBackend::Primary);
        finished.start(&sink, clip()).unwrap();
        finished.finish(PlaybackOutcome::Finished);
        finished.stop();
        finished.stop();
        assert_eq!(finished.state(), SessionState::Disposed);

        assert_eq!(sink.halts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_start_twice_rejected() {
        let sink = ManualSink::default();
        let mut session = SpeechSession::new(1, SpeechBackend::Primary);
        session.start(&sink, clip()).unwrap();
        assert!(matches!(
            session.start(&sink, clip()),
            Err(Error::PlaybackInit(_))
        ));
    }

    #[test]
    fn test_start_failure_is_init_error_and_disposes() {
        let sink = ManualSink {
            fail: true,
            ..Default::default()
        };
        let mut session = SpeechSession::new(1, SpeechBackend::Primary);
        let err = session.start(&sink, clip()).unwrap_err();

        assert!(matches!(err, Error::PlaybackInit(msg) if msg.contains("device busy")));
        assert_eq!(session.state(), SessionState::Disposed);
    }

    #[tokio::test]
    async fn test_completion_finished() {
        let sink = ManualSink::default();
        let mut session = SpeechSession::new(1, SpeechBackend::Fallback);
        let completion = session.start(&sink, clip()).unwrap();

        sink.finishers.lock().unwrap().pop().unwrap().send(()).unwrap();
        let outcome = completion
            .wait(Instant::now() + Duration::from_secs(5))
            .await;

        assert_eq!(outcome, PlaybackOutcome::Finished);
        session.finish(outcome);
        assert_eq!(session.state(), SessionState::Disposed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_times_out() {
        let sink = ManualSink::default();
        let mut session = SpeechSession::new(1, SpeechBackend::Fallback);
        let completion = session.start(&sink, clip()).unwrap();

        let outcome = completion
            .wait(Instant::now() + Duration::from_millis(500))
            .await;

        assert_eq!(outcome, PlaybackOutcome::TimedOut);
        session.finish(outcome);
        assert_eq!(session.state(), SessionState::Disposed);
        assert_eq!(sink.halts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_wakes_completion() {
        let sink = ManualSink::default();
        let mut session = SpeechSession::new(1, SpeechBackend::Primary);
        let completion = session.start(&sink, clip()).unwrap();

        session.stop();
        let outcome = completion
            .wait(Instant::now() + Duration::from_secs(60))
            .await;

        assert_eq!(outcome, PlaybackOutcome::Stopped);
    }

    #[test]
    fn test_drop_halts_playback() {
        let sink = ManualSink::default();
        {
            let mut session = SpeechSession::new(1, SpeechBackend::Primary);
            session.start(&sink, clip()).unwrap();
        }
        assert_eq!(sink.halts.load(Ordering::SeqCst), 1);
    }
}
