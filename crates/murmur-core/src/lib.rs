//! Murmur core crate - shared error type, settings, performance history,
//! and the notification vocabulary the lifecycle controller emits.

pub mod error;
pub mod events;
pub mod fmt;
pub mod settings;
pub mod stats;
pub mod types;

/// Sample rate the whole pipeline runs at, in Hz. Capture resamples to this
/// and the speech models expect it.
pub const SAMPLE_RATE: u32 = 16000;

pub use error::{MurmurError, Result};
pub use events::Notification;
pub use settings::{FsStore, MemoryStore, Settings, SettingsStore, SETTINGS_FILE};
pub use stats::{default_ratio, ModelHistory, PerformanceEstimator, TranscriptionSample, STATS_FILE};
pub use types::{AppState, Timestamp};
