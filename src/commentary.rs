//! Commentary log
//!
//! Append-only, process-lifetime record of every utterance the companion has
//! produced. The joined history is fed back into the next prompt so the
//! character can avoid repeating itself.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum characters kept from any model response
pub const MAX_UTTERANCE_CHARS: usize = 200;

/// Placeholder used in prompts before anything has been said
pub const EMPTY_HISTORY: &str = "(no previous responses yet)";

/// Where an utterance came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UtteranceSource {
    /// Ambient screen commentary
    Perception,
    /// Reply to a chat message
    Chat,
}

/// A single piece of in-character commentary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Utterance {
    text: String,
    source: UtteranceSource,
    timestamp: DateTime<Utc>,
}

impl Utterance {
    /// Create an utterance, truncating the text to [`MAX_UTTERANCE_CHARS`]
    #[must_use]
    pub fn new(text: &str, source: UtteranceSource) -> Self {
        Self {
            text: truncate_chars(text, MAX_UTTERANCE_CHARS),
            source,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn source(&self) -> UtteranceSource {
        self.source
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Truncate `text` to at most `max` characters, respecting char boundaries
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Ordered, append-only log of utterances
#[derive(Debug, Default)]
pub struct CommentaryLog {
    entries: Mutex<Vec<Utterance>>,
}

impl CommentaryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Utterance>> {
        // Appends are single pushes, so a poisoned vec is still consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an utterance at the end of the log
    pub fn append(&self, utterance: Utterance) {
        let mut entries = self.entries();
        entries.push(utterance);
        tracing::debug!(entries = entries.len(), "commentary appended");
    }

    /// Copy of all utterances, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<Utterance> {
        self.entries().clone()
    }

    /// All utterance texts joined by newlines, oldest first
    #[must_use]
    pub fn joined(&self) -> String {
        self.entries()
            .iter()
            .map(Utterance::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Joined history, or [`EMPTY_HISTORY`] when nothing has been said yet
    #[must_use]
    pub fn prompt_history(&self) -> String {
        let joined = self.joined();
        if joined.is_empty() {
            EMPTY_HISTORY.to_string()
        } else {
            joined
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
