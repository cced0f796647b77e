//! Character profiles and the current-character roster
//!
//! A character supplies the persona text embedded in every prompt and the
//! voice identifier handed to the primary TTS backend. Characters without a
//! voice identifier are spoken by the free backend only.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identity, persona and voice of one companion character
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CharacterProfile {
    /// Unique identifier
    pub id: String,

    /// Display name used in prompts
    pub name: String,

    /// Personality and tone instructions
    pub personality: String,

    /// Primary TTS voice identifier; `None` means "no remote voice"
    #[serde(default)]
    pub voice_id: Option<String>,

    /// Portrait asset shown by the overlay
    #[serde(default)]
    pub portrait: Option<PathBuf>,
}

impl CharacterProfile {
    /// Whether this character has a voice on the primary TTS backend
    #[must_use]
    pub fn has_remote_voice(&self) -> bool {
        self.voice_id.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}

/// Built-in characters, available without a config file
#[must_use]
pub fn builtin_characters() -> Vec<CharacterProfile> {
    vec![
        CharacterProfile {
            id: "kangel".to_string(),
            name: "KAngel from Needy Streamer Overdose".to_string(),
            personality: "Keep your tone flirty, condescending, or self-deprecating.".to_string(),
            voice_id: Some("JBFqnCBsd6RMkjVDRZzb".to_string()),
            portrait: Some(PathBuf::from("assets/kangel.png")),
        },
        CharacterProfile {
            id: "ame".to_string(),
            name: "Ame from Needy Streamer Overdose".to_string(),
            personality: "Keep your tone tired, anxious, and quietly sarcastic.".to_string(),
            voice_id: None,
            portrait: Some(PathBuf::from("assets/ame.png")),
        },
    ]
}

/// Static set of characters with exactly one current
///
/// Switching swaps an `Arc`, so cycles that already snapshotted the previous
/// character keep using it until they finish.
#[derive(Debug)]
pub struct CharacterRoster {
    profiles: Vec<Arc<CharacterProfile>>,
    current: RwLock<Arc<CharacterProfile>>,
}

impl CharacterRoster {
    /// Build a roster and select `current_id`
    ///
    /// # Errors
    ///
    /// Returns error if the roster is empty, contains duplicate ids, or does
    /// not contain `current_id`
    pub fn new(profiles: Vec<CharacterProfile>, current_id: &str) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for profile in &profiles {
            if !seen.insert(profile.id.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate character id: {}",
                    profile.id
                )));
            }
        }

        let profiles: Vec<_> = profiles.into_iter().map(Arc::new).collect();
        let current = profiles
            .iter()
            .find(|p| p.id == current_id)
            .cloned()
            .ok_or_else(|| Error::CharacterNotFound(current_id.to_string()))?;

        Ok(Self {
            profiles,
            current: RwLock::new(current),
        })
    }

    /// Snapshot of the current character
    #[must_use]
    pub fn current(&self) -> Arc<CharacterProfile> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Make `id` the current character
    ///
    /// # Errors
    ///
    /// Returns error if no character has this id
    pub fn select(&self, id: &str) -> Result<Arc<CharacterProfile>> {
        let profile = self
            .get(id)
            .ok_or_else(|| Error::CharacterNotFound(id.to_string()))?;

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&profile);
        tracing::info!(character = %profile.id, "character selected");
        Ok(profile)
    }

    /// Look up a character by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<CharacterProfile>> {
        self.profiles.iter().find(|p| p.id == id).cloned()
    }

    /// All characters in configuration order
    #[must_use]
    pub fn profiles(&self) -> &[Arc<CharacterProfile>] {
        &self.profiles
    }
}
