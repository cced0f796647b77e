//! Prompt builders for screen commentary and chat replies

use crate::character::CharacterProfile;
use crate::commentary::MAX_UTTERANCE_CHARS;

/// Build the prompt sent alongside a screenshot
///
/// `history` is the joined commentary log (or its placeholder).
#[must_use]
pub fn observation_prompt(character: &CharacterProfile, history: &str) -> String {
    let name = &character.name;
    format!(
        "You are {name}. You provide commentary based on the contents of the user's screen.

Here are ALL your previous comments:
{history}

Your job:
- You must always respond in character as {name}.
- {personality}
- Keep your response minimal, and under {MAX_UTTERANCE_CHARS} characters. Anything exceeding {MAX_UTTERANCE_CHARS} characters will be truncated.
- Provide commentary based on the contents of the image.
- Avoid repetition and make your next response unique.",
        personality = character.personality.trim(),
    )
}

/// Build the prompt for replying to a fan's chat message
#[must_use]
pub fn chat_prompt(character: &CharacterProfile, message: &str, history: &str) -> String {
    let name = &character.name;
    format!(
        "You are {name}. A fan has sent you the message: \"{message}\".

Here are ALL your previous comments (from both chat and image analysis):
{history}

Your job:
- You must always respond in character as {name}.
- Provide a response to the fan's message.
- {personality}
- Keep your response minimal, and under {MAX_UTTERANCE_CHARS} characters. Anything exceeding {MAX_UTTERANCE_CHARS} characters will be truncated.
- Avoid repetition and make your next response unique.",
        message = message.trim(),
        personality = character.personality.trim(),
    )
}
