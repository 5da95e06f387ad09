use serde::{Deserialize, Serialize};

use crate::types::{AppState, Timestamp};

/// All notifications the lifecycle controller emits to its observers.
///
/// Observers (a UI shell, the CLI event log) consume these from a channel;
/// the controller never calls into observers directly. Every variant carries
/// the wall-clock time it was emitted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Notification {
    /// The lifecycle state changed, with a short human-readable status line.
    StateChanged {
        state: AppState,
        message: String,
        timestamp: Timestamp,
    },

    /// A user-visible error occurred. The controller state alone determines
    /// what actions remain valid; errors carry no further machine state.
    ErrorOccurred { message: String, timestamp: Timestamp },

    /// Byte-level progress for an in-flight model download.
    ///
    /// `percent` is in `[0, 99.9]` while the download runs, exactly `100.0`
    /// on the terminal completion notification, and `-1.0` as a sentinel
    /// meaning "hide progress display" after a failure.
    DownloadProgress {
        model_id: String,
        percent: f64,
        message: String,
        timestamp: Timestamp,
    },

    /// A model finished downloading and is ready to select.
    ModelReady {
        model_id: String,
        timestamp: Timestamp,
    },

    /// Periodic progress for an in-flight transcription.
    TranscriptionProgress {
        percent: f64,
        elapsed_secs: f64,
        eta_secs: f64,
        timestamp: Timestamp,
    },

    /// Loudness of the most recent captured chunk, for a live level meter.
    /// Scaled RMS, clamped to `[0.0, 1.0]`.
    AudioLevel { level: f32, timestamp: Timestamp },
}

impl Notification {
    /// The wall-clock time this notification was emitted.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Notification::StateChanged { timestamp, .. }
            | Notification::ErrorOccurred { timestamp, .. }
            | Notification::DownloadProgress { timestamp, .. }
            | Notification::ModelReady { timestamp, .. }
            | Notification::TranscriptionProgress { timestamp, .. }
            | Notification::AudioLevel { timestamp, .. } => *timestamp,
        }
    }

    /// Stable snake_case name for logs and UI dispatch.
    pub fn name(&self) -> &'static str {
        match self {
            Notification::StateChanged { .. } => "state_changed",
            Notification::ErrorOccurred { .. } => "error_occurred",
            Notification::DownloadProgress { .. } => "download_progress",
            Notification::ModelReady { .. } => "model_ready",
            Notification::TranscriptionProgress { .. } => "transcription_progress",
            Notification::AudioLevel { .. } => "audio_level",
        }
    }
}
