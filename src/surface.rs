//! Display surface consumed by the orchestrator
//!
//! The overlay window itself lives outside this crate. The orchestrator only
//! needs to set the displayed text and toggle the "thinking" indicator.

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Text shown while a model call is in flight
pub const THINKING_TEXT: &str = "Thinking...";

/// Where commentary text and status are displayed
pub trait Surface: Send + Sync {
    /// Replace the displayed text
    fn set_text(&self, text: &str);

    /// Show or clear the thinking indicator
    fn set_thinking(&self, thinking: bool);

    /// Show a short, transient status message in place of commentary
    fn show_status(&self, message: &str) {
        self.set_text(message);
    }
}

/// Reveal `text` one character at a time
///
/// Returns `false` if `cancel` fired before the full text was shown.
pub async fn reveal(
    surface: &dyn Surface,
    text: &str,
    per_char: Duration,
    cancel: &CancellationToken,
) -> bool {
    if per_char.is_zero() {
        surface.set_text(text);
        return true;
    }

    let mut shown = String::with_capacity(text.len());
    for ch in text.chars() {
        if cancel.is_cancelled() {
            return false;
        }
        shown.push(ch);
        surface.set_text(&shown);

        tokio::select! {
            () = cancel.cancelled() => return false,
            () = tokio::time::sleep(per_char) => {}
        }
    }

    true
}

/// Surface that redraws a single terminal line
#[derive(Debug, Default)]
pub struct ConsoleSurface {
    last_len: Mutex<usize>,
}

impl ConsoleSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Surface for ConsoleSurface {
    fn set_text(&self, text: &str) {
        let mut last_len = self
            .last_len
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let padding = last_len.saturating_sub(text.chars().count());
        let mut stdout = std::io::stdout().lock();
        // Terminal write failures are not worth interrupting the loop for
        let _ = write!(stdout, "\r{text}{}", " ".repeat(padding));
        let _ = stdout.flush();

        *last_len = text.chars().count();
    }

    fn set_thinking(&self, thinking: bool) {
        if thinking {
            self.set_text(THINKING_TEXT);
        }
        tracing::trace!(thinking, "thinking indicator");
    }

    fn show_status(&self, message: &str) {
        self.set_text(message);
        tracing::warn!(status = message, "status shown");
    }
}
