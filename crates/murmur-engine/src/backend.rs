//! Inference backend seam.
//!
//! [`SpeechBackend`] turns a weights file on disk into a [`SpeechModel`];
//! the model turns PCM samples into timed text segments. The engine only
//! ever talks to these traits, so tests swap in [`MockBackend`] and the
//! real whisper.cpp bindings stay behind a feature flag.

use std::path::Path;
use std::sync::{Arc, Mutex};

use murmur_core::Result;

/// One recognized stretch of speech, with start/end offsets in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Segment {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Decoding knobs passed through to the backend.
///
/// `language` of `None` means auto-detect. The VAD fields are hints; a
/// backend that has no voice-activity filter may ignore them.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribeOptions {
    pub language: Option<String>,
    pub beam_size: usize,
    pub vad_min_silence_ms: u32,
    pub vad_speech_pad_ms: u32,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        TranscribeOptions {
            language: None,
            beam_size: 5,
            vad_min_silence_ms: 500,
            vad_speech_pad_ms: 400,
        }
    }
}

/// Loads model weights from disk into a ready-to-run model.
pub trait SpeechBackend: Send + Sync {
    fn load_model(&self, weights: &Path) -> Result<Box<dyn SpeechModel>>;
}

/// A resident model that can run inference.
///
/// `on_segment` fires once per decoded segment, in order. Implementations
/// must not call it after returning an error.
pub trait SpeechModel: Send {
    fn transcribe(
        &self,
        samples: &[f32],
        options: &TranscribeOptions,
        on_segment: &mut dyn FnMut(&Segment),
    ) -> Result<()>;
}

/// Record of one [`MockBackend`] transcription call.
#[derive(Debug, Clone)]
pub struct TranscribeCall {
    pub sample_count: usize,
    pub options: TranscribeOptions,
}

/// In-memory backend for tests. Serves a fixed segment list and records
/// every load and transcribe call.
#[derive(Clone, Default)]
pub struct MockBackend {
    segments: Vec<Segment>,
    fail_load: bool,
    fail_transcribe: bool,
    loaded: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<TranscribeCall>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the segments every transcription will yield.
    pub fn with_segments(mut self, segments: Vec<Segment>) -> Self {
        self.segments = segments;
        self
    }

    /// Makes every `load_model` call fail.
    pub fn with_load_failure(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Makes every `transcribe` call fail.
    pub fn with_transcribe_failure(mut self) -> Self {
        self.fail_transcribe = true;
        self
    }

    /// Weights paths passed to `load_model`, in call order.
    pub fn loaded_paths(&self) -> Vec<String> {
        self.loaded.lock().expect("mock mutex poisoned").clone()
    }

    /// Every transcription call made against models from this backend.
    pub fn transcribe_calls(&self) -> Vec<TranscribeCall> {
        self.calls.lock().expect("mock mutex poisoned").clone()
    }
}

impl SpeechBackend for MockBackend {
    fn load_model(&self, weights: &Path) -> Result<Box<dyn SpeechModel>> {
        if self.fail_load {
            return Err(murmur_core::MurmurError::Engine(
                "mock load failure".to_string(),
            ));
        }
        self.loaded
            .lock()
            .expect("mock mutex poisoned")
            .push(weights.display().to_string());
        Ok(Box::new(MockModel {
            segments: self.segments.clone(),
            fail: self.fail_transcribe,
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct MockModel {
    segments: Vec<Segment>,
    fail: bool,
    calls: Arc<Mutex<Vec<TranscribeCall>>>,
}

impl SpeechModel for MockModel {
    fn transcribe(
        &self,
        samples: &[f32],
        options: &TranscribeOptions,
        on_segment: &mut dyn FnMut(&Segment),
    ) -> Result<()> {
        self.calls
            .lock()
            .expect("mock mutex poisoned")
            .push(TranscribeCall {
                sample_count: samples.len(),
                options: options.clone(),
            });
        if self.fail {
            return Err(murmur_core::MurmurError::Transcription(
                "mock transcription failure".to_string(),
            ));
        }
        for segment in &self.segments {
            on_segment(segment);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_options() {
        let options = TranscribeOptions::default();
        assert_eq!(options.language, None);
        assert_eq!(options.beam_size, 5);
        assert_eq!(options.vad_min_silence_ms, 500);
        assert_eq!(options.vad_speech_pad_ms, 400);
    }

    #[test]
    fn test_mock_backend_records_loads() {
        let backend = MockBackend::new();
        backend
            .load_model(&PathBuf::from("/models/tiny/model.bin"))
            .unwrap();
        assert_eq!(backend.loaded_paths(), vec!["/models/tiny/model.bin"]);
    }

    #[test]
    fn test_mock_backend_load_failure() {
        let backend = MockBackend::new().with_load_failure();
        assert!(backend.load_model(&PathBuf::from("/x")).is_err());
        assert!(backend.loaded_paths().is_empty());
    }

    #[test]
    fn test_mock_model_yields_segments_in_order() {
        let backend = MockBackend::new().with_segments(vec![
            Segment::new(0.0, 1.0, "one"),
            Segment::new(1.0, 2.0, "two"),
        ]);
        let model = backend.load_model(&PathBuf::from("/x")).unwrap();

        let mut seen = Vec::new();
        model
            .transcribe(&[0.0; 16], &TranscribeOptions::default(), &mut |s| {
                seen.push(s.text.clone())
            })
            .unwrap();
        assert_eq!(seen, vec!["one", "two"]);

        let calls = backend.transcribe_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].sample_count, 16);
    }

    #[test]
    fn test_mock_model_failure_yields_no_segments() {
        let backend = MockBackend::new()
            .with_segments(vec![Segment::new(0.0, 1.0, "one")])
            .with_transcribe_failure();
        let model = backend.load_model(&PathBuf::from("/x")).unwrap();

        let mut seen = 0;
        let result = model.transcribe(&[], &TranscribeOptions::default(), &mut |_| seen += 1);
        assert!(result.is_err());
        assert_eq!(seen, 0);
    }
}
