//! Shared vocabulary types used across the Murmur crates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operational state of the application lifecycle.
///
/// Exactly one value at any instant; all writes go through the controller's
/// guarded state cell. Entering a busy state (`Recording`, `Transcribing`,
/// `Typing`, `Downloading`, `Loading`) is itself the mutual-exclusion
/// mechanism for long-running work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppState {
    /// A model is being loaded into memory (also the initial state).
    Loading,
    /// Ready for dictation. A model is loaded and the hotkey is live.
    Idle,
    /// Actively capturing microphone audio.
    Recording,
    /// Captured audio is being transcribed in the background.
    Transcribing,
    /// Transcribed text is being typed into the focused application.
    Typing,
    /// A model download is in flight.
    Downloading,
    /// No usable model is selected or downloaded.
    NoModel,
    /// A recoverable failure occurred; auto-recovery is pending.
    Error,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppState::Loading => write!(f, "Loading"),
            AppState::Idle => write!(f, "Idle"),
            AppState::Recording => write!(f, "Recording"),
            AppState::Transcribing => write!(f, "Transcribing"),
            AppState::Typing => write!(f, "Typing"),
            AppState::Downloading => write!(f, "Downloading"),
            AppState::NoModel => write!(f, "NoModel"),
            AppState::Error => write!(f, "Error"),
        }
    }
}

impl AppState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &AppState) -> bool {
        matches!(
            (self, target),
            // Startup load resolution
            (AppState::Loading, AppState::Idle)
                | (AppState::Loading, AppState::NoModel)
                | (AppState::Loading, AppState::Error)
                // Dictation cycle
                | (AppState::Idle, AppState::Recording)
                | (AppState::Recording, AppState::Transcribing)
                | (AppState::Recording, AppState::Idle)
                | (AppState::Transcribing, AppState::Typing)
                | (AppState::Transcribing, AppState::Idle)
                | (AppState::Typing, AppState::Idle)
                // Model management
                | (AppState::Idle, AppState::Loading)
                | (AppState::Idle, AppState::Downloading)
                | (AppState::NoModel, AppState::Loading)
                | (AppState::NoModel, AppState::Downloading)
                | (AppState::Downloading, AppState::Idle)
                | (AppState::Downloading, AppState::NoModel)
                // Failure entry
                | (AppState::Idle, AppState::Error)
                | (AppState::Recording, AppState::Error)
                | (AppState::Transcribing, AppState::Error)
                | (AppState::Typing, AppState::Error)
                | (AppState::Downloading, AppState::Error)
                // Recovery and retry
                | (AppState::Error, AppState::Idle)
                | (AppState::Error, AppState::NoModel)
                | (AppState::Error, AppState::Loading)
                | (AppState::Error, AppState::Downloading)
        )
    }

    /// States in which the user may switch or load a different model.
    pub fn accepts_model_change(&self) -> bool {
        matches!(self, AppState::Idle | AppState::NoModel | AppState::Error)
    }
}

/// Unix-seconds timestamp attached to notification events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }
}
