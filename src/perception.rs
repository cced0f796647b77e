//! Perception step: screenshot (or chat message) in, commentary text out
//!
//! Failures come back as `Error::Analysis` so the caller can branch on the
//! result without inspecting the text.

use std::sync::Arc;

use crate::capture::Screenshot;
use crate::character::CharacterProfile;
use crate::commentary::{CommentaryLog, MAX_UTTERANCE_CHARS, truncate_chars};
use crate::model::{ChatCompleter, VisionAnalyzer};
use crate::prompt;
use crate::{Error, Result};

/// Produces in-character commentary from the model collaborators
pub struct Perception {
    vision: Arc<dyn VisionAnalyzer>,
    chat: Arc<dyn ChatCompleter>,
}

impl Perception {
    #[must_use]
    pub fn new(vision: Arc<dyn VisionAnalyzer>, chat: Arc<dyn ChatCompleter>) -> Self {
        Self { vision, chat }
    }

    /// Comment on a screenshot, given everything said so far
    ///
    /// # Errors
    ///
    /// Returns `Error::Analysis` if the model call fails or returns nothing
    pub async fn analyze(
        &self,
        screenshot: &Screenshot,
        log: &CommentaryLog,
        character: &CharacterProfile,
    ) -> Result<String> {
        let prompt = prompt::observation_prompt(character, &log.prompt_history());
        tracing::debug!(character = %character.id, history = log.len(), "analyzing screenshot");

        finalize(self.vision.analyze(&prompt, screenshot).await)
    }

    /// Reply to a chat message, given everything said so far
    ///
    /// # Errors
    ///
    /// Returns `Error::Analysis` if the model call fails or returns nothing
    pub async fn respond(
        &self,
        message: &str,
        log: &CommentaryLog,
        character: &CharacterProfile,
    ) -> Result<String> {
        let prompt = prompt::chat_prompt(character, message, &log.prompt_history());
        tracing::debug!(character = %character.id, history = log.len(), "answering chat");

        finalize(self.chat.complete(&prompt).await)
    }
}

/// Normalize a model result: classify errors, reject empty text, truncate
fn finalize(result: Result<String>) -> Result<String> {
    let text = result.map_err(|e| match e {
        Error::Analysis(_) => e,
        other => Error::Analysis(other.to_string()),
    })?;

    let text = text.trim();
    if text.is_empty() {
        return Err(Error::Analysis("empty response from model".to_string()));
    }

    Ok(truncate_chars(text, MAX_UTTERANCE_CHARS))
}
