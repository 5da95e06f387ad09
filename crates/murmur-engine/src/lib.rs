//! Murmur engine crate - speech model lifecycle and transcription.
//!
//! [`TranscriptionEngine`] keeps at most one model resident, pulls missing
//! weights through `murmur-hub`, and turns 16 kHz PCM into text with
//! per-segment progress. Inference itself sits behind [`SpeechBackend`]:
//! [`WhisperBackend`] binds whisper.cpp when the `whisper` feature is on,
//! and tests drive the engine with [`MockBackend`].

pub mod backend;
pub mod engine;
pub mod state;
pub mod whisper;

pub use backend::{MockBackend, Segment, SpeechBackend, SpeechModel, TranscribeCall, TranscribeOptions};
pub use engine::TranscriptionEngine;
pub use state::EngineState;
pub use whisper::WhisperBackend;
