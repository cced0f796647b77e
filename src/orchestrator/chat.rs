//! Chat interrupt
//!
//! A chat message preempts the ambient loop: the current run is cancelled,
//! audio is force-stopped, and the reply goes through the same log → reveal →
//! speak path. Once the reply is done (or has failed) the loop resumes after
//! the settle delay, unless something else has taken control in between.

use std::time::Duration;

use super::{Orchestrator, RunState};
use crate::Error;
use crate::commentary::UtteranceSource;

/// Result of a chat submission
#[derive(Debug)]
pub enum ChatOutcome {
    /// Blank input; the loop was resumed straight away
    Empty,
    /// The companion answered with this text
    Replied(String),
    /// The model call failed; the error was shown as a status
    Failed(Error),
    /// A pause, stop or newer chat arrived before the answer was ready
    Superseded,
}

impl Orchestrator {
    /// Send a chat message to the companion
    ///
    /// Takes priority over the ambient loop, which resumes once the reply has
    /// been spoken or the attempt has failed.
    pub async fn submit(&self, message: &str) -> ChatOutcome {
        let (epoch, token) = self.preempt(RunState::Stopped);

        let message = message.trim();
        if message.is_empty() {
            tracing::debug!("empty chat message, resuming loop");
            self.resume_if_current(epoch);
            return ChatOutcome::Empty;
        }

        // Fires on every exit path, including this future being dropped
        let _resume = ResumeGuard {
            orchestrator: self.clone(),
            epoch,
            delay: self.inner.timing.settle_delay,
        };

        let character = self.inner.roster.current();
        tracing::info!(character = %character.id, chars = message.chars().count(), "chat received");

        self.inner.surface.set_thinking(true);
        let result = self
            .inner
            .perception
            .respond(message, &self.inner.log, &character)
            .await;

        if token.is_cancelled() {
            tracing::debug!("discarding superseded chat reply");
            return ChatOutcome::Superseded;
        }
        self.inner.surface.set_thinking(false);

        match result {
            Ok(text) => {
                self.deliver(&text, UtteranceSource::Chat, &character, &token)
                    .await;
                ChatOutcome::Replied(text)
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat reply failed");
                self.inner.surface.show_status(&e.status_message());
                ChatOutcome::Failed(e)
            }
        }
    }
}

/// Resumes the loop after a delay when dropped
struct ResumeGuard {
    orchestrator: Orchestrator,
    epoch: u64,
    delay: Duration,
}

impl Drop for ResumeGuard {
    fn drop(&mut self) {
        let orchestrator = self.orchestrator.clone();
        let epoch = self.epoch;
        let delay = self.delay;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    orchestrator.resume_if_current(epoch);
                });
            }
            Err(_) => tracing::warn!("no runtime to resume the loop after chat"),
        }
    }
}

