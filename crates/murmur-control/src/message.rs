//! Messages the controller's background workers send back to its run loop.

use murmur_core::Result;

/// Everything that can happen off the controller's own task.
///
/// Workers never touch controller state directly; they describe what
/// happened and the run loop applies it, so every state write stays on one
/// consumer.
#[derive(Debug)]
pub enum WorkerMessage {
    /// The global hotkey was pressed.
    HotkeyPressed,

    /// Loudness of the latest captured audio chunk.
    AudioLevel { level: f32 },

    /// Progress report from an in-flight model load (download phase
    /// included).
    LoadProgress {
        model_id: String,
        percent: f64,
        message: String,
    },

    /// A model load finished, successfully or not.
    LoadFinished {
        model_id: String,
        result: Result<()>,
    },

    /// Progress report from an explicit model download.
    DownloadProgress {
        model_id: String,
        percent: f64,
        message: String,
    },

    /// An explicit model download finished.
    DownloadFinished {
        model_id: String,
        result: Result<()>,
    },

    /// The engine decoded another segment, `percent` through the audio.
    TranscriptionProgress { percent: f64 },

    /// Transcription finished. `audio_duration` and `elapsed` are in
    /// seconds and feed the performance history on success.
    TranscriptionFinished {
        result: Result<String>,
        audio_duration: f64,
        elapsed: f64,
    },

    /// The injector finished typing the transcript.
    TypingFinished { result: Result<()> },
}
