//! Orchestration loop
//!
//! Runs capture → analyze → reveal → speak cycles with a fixed delay between
//! them. Each run of the loop owns a `CancellationToken`; pausing, stopping or
//! a chat preemption cancels it and force-stops audio. Model calls already in
//! flight are not aborted: they finish, see the cancelled token, and their
//! results are dropped without touching the log, the surface or the speakers.
//!
//! Capture and analysis failures end the cycle early with a status message.
//! There are no immediate retries; the next cycle, after the normal delay, is
//! the retry.

mod chat;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use chat::ChatOutcome;

use crate::capture::ScreenCapture;
use crate::character::{CharacterProfile, CharacterRoster};
use crate::commentary::{CommentaryLog, Utterance, UtteranceSource};
use crate::config::TimingConfig;
use crate::perception::Perception;
use crate::surface::{Surface, reveal};
use crate::voice::SpeechGateway;
use crate::{Error, Result};

/// Run state of the ambient loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Stopped,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Everything the orchestrator drives
pub struct Components {
    pub capture: Arc<dyn ScreenCapture>,
    pub perception: Perception,
    /// `None` when voice output is disabled
    pub speech: Option<SpeechGateway>,
    pub surface: Arc<dyn Surface>,
    pub roster: CharacterRoster,
    pub timing: TimingConfig,
}

/// Handle to the companion's loop; cheap to clone
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    capture: Arc<dyn ScreenCapture>,
    perception: Perception,
    speech: Option<SpeechGateway>,
    surface: Arc<dyn Surface>,
    roster: CharacterRoster,
    timing: TimingConfig,
    log: CommentaryLog,
    control: Mutex<Control>,
    state_tx: watch::Sender<RunState>,
    cycles: AtomicU64,
}

/// Mutable loop control, only touched under the mutex
struct Control {
    state: RunState,
    /// Bumped by every start and preemption
    epoch: u64,
    /// Cancelled when the current run (loop or chat) is superseded
    token: CancellationToken,
}

impl Orchestrator {
    #[must_use]
    pub fn new(components: Components) -> Self {
        let (state_tx, _) = watch::channel(RunState::Stopped);

        Self {
            inner: Arc::new(Inner {
                capture: components.capture,
                perception: components.perception,
                speech: components.speech,
                surface: components.surface,
                roster: components.roster,
                timing: components.timing,
                log: CommentaryLog::new(),
                control: Mutex::new(Control {
                    state: RunState::Stopped,
                    epoch: 0,
                    token: CancellationToken::new(),
                }),
                state_tx,
                cycles: AtomicU64::new(0),
            }),
        }
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.inner
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the loop
    ///
    /// Returns `false` without side effects if it is already running.
    pub fn start(&self) -> bool {
        let mut control = self.control();
        self.start_locked(&mut control)
    }

    fn start_locked(&self, control: &mut Control) -> bool {
        if control.state == RunState::Running {
            tracing::debug!("loop already running");
            return false;
        }

        control.token.cancel();
        control.token = CancellationToken::new();
        control.epoch += 1;
        control.state = RunState::Running;
        self.inner.state_tx.send_replace(RunState::Running);

        let this = self.clone();
        let token = control.token.clone();
        tokio::spawn(async move { this.run_loop(token).await });

        tracing::info!(epoch = control.epoch, "loop started");
        true
    }

    /// Resume after a pause, starting from a fresh cycle
    pub fn resume(&self) -> bool {
        self.start()
    }

    /// Pause the loop and silence audio immediately
    pub fn pause(&self) {
        self.preempt(RunState::Paused);
    }

    /// Stop the loop and silence audio immediately
    pub fn stop(&self) {
        self.preempt(RunState::Stopped);
    }

    /// Move to `state`, cancel the current run, and silence the companion
    ///
    /// Returns the new epoch and a fresh token for whoever preempted.
    fn preempt(&self, state: RunState) -> (u64, CancellationToken) {
        let (epoch, token) = {
            let mut control = self.control();
            control.token.cancel();
            control.token = CancellationToken::new();
            control.epoch += 1;
            control.state = state;
            (control.epoch, control.token.clone())
        };
        self.inner.state_tx.send_replace(state);

        if let Some(speech) = &self.inner.speech {
            speech.stop();
        }
        self.inner.surface.set_thinking(false);

        tracing::info!(%state, epoch, "loop preempted");
        (epoch, token)
    }

    /// Start the loop only if nothing has happened since `epoch`
    fn resume_if_current(&self, epoch: u64) -> bool {
        let mut control = self.control();
        if control.epoch != epoch {
            tracing::debug!(epoch, current = control.epoch, "resume superseded");
            return false;
        }
        self.start_locked(&mut control)
    }

    /// Current run state
    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.control().state
    }

    /// Watch run-state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.inner.state_tx.subscribe()
    }

    /// Commentary produced so far
    #[must_use]
    pub fn log(&self) -> &CommentaryLog {
        &self.inner.log
    }

    #[must_use]
    pub fn roster(&self) -> &CharacterRoster {
        &self.inner.roster
    }

    /// Switch characters; in-flight cycles keep the previous one
    ///
    /// # Errors
    ///
    /// Returns error if no character has this id
    pub fn select_character(&self, id: &str) -> Result<Arc<CharacterProfile>> {
        self.inner.roster.select(id)
    }

    /// Speech gateway, if voice is enabled
    #[must_use]
    pub fn speech(&self) -> Option<&SpeechGateway> {
        self.inner.speech.as_ref()
    }

    /// Number of ambient cycles started
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.inner.cycles.load(Ordering::Relaxed)
    }

    async fn run_loop(self, token: CancellationToken) {
        while !token.is_cancelled() {
            let cycle = self.inner.cycles.fetch_add(1, Ordering::Relaxed) + 1;
            self.ambient_cycle(cycle, &token)
                .instrument(tracing::debug_span!("cycle", cycle))
                .await;

            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(self.inner.timing.cycle_delay) => {}
            }
        }
        tracing::debug!("loop task exited");
    }

    /// One capture → analyze → reveal → speak pass
    async fn ambient_cycle(&self, cycle: u64, token: &CancellationToken) {
        let character = self.inner.roster.current();
        tracing::debug!(character = %character.id, "cycle started");

        self.inner.surface.set_thinking(true);
        let result = self.observe(&character).await;

        if token.is_cancelled() {
            tracing::debug!(cycle, "discarding result of preempted cycle");
            return;
        }
        self.inner.surface.set_thinking(false);

        match result {
            Ok(text) => {
                self.deliver(&text, UtteranceSource::Perception, &character, token)
                    .await;
            }
            Err(e) => {
                tracing::warn!(cycle, error = %e, "cycle failed, retrying next cycle");
                self.inner.surface.show_status(&e.status_message());
            }
        }
    }

    async fn observe(&self, character: &CharacterProfile) -> Result<String> {
        let screenshot = self.inner.capture.capture().await.map_err(|e| match e {
            Error::Capture(_) => e,
            other => Error::Capture(other.to_string()),
        })?;

        self.inner
            .perception
            .analyze(&screenshot, &self.inner.log, character)
            .await
    }

    /// Log, reveal and speak a fresh utterance
    async fn deliver(
        &self,
        text: &str,
        source: UtteranceSource,
        character: &CharacterProfile,
        token: &CancellationToken,
    ) {
        self.inner.log.append(Utterance::new(text, source));

        if !reveal(
            self.inner.surface.as_ref(),
            text,
            self.inner.timing.reveal_delay,
            token,
        )
        .await
        {
            return;
        }

        if let Some(speech) = &self.inner.speech {
            let report = speech.speak(text, character, token).await;
            tracing::debug!(?report, "speech finished");
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.run_state())
            .field("cycles", &self.cycles())
            .field("log_len", &self.inner.log.len())
            .finish_non_exhaustive()
    }
}
