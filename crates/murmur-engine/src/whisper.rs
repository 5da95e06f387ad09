//! whisper.cpp inference backend.
//!
//! Only compiled against the bindings when the `whisper` feature is on.
//! Without it the backend still type-checks but refuses to load models, so
//! the workspace builds on machines without a C++ toolchain.

use std::path::Path;

use murmur_core::{MurmurError, Result};

use crate::backend::{SpeechBackend, SpeechModel};
#[cfg(feature = "whisper")]
use crate::backend::{Segment, TranscribeOptions};

/// Speech backend over the whisper.cpp bindings.
///
/// Beam size and language are applied from the transcribe options; the VAD
/// hints are not, since the bindings expose no voice-activity controls.
#[derive(Debug, Default)]
pub struct WhisperBackend;

impl WhisperBackend {
    pub fn new() -> Self {
        WhisperBackend
    }
}

#[cfg(feature = "whisper")]
impl SpeechBackend for WhisperBackend {
    fn load_model(&self, weights: &Path) -> Result<Box<dyn SpeechModel>> {
        use whisper_rs::{WhisperContext, WhisperContextParameters};

        let path = weights.to_str().ok_or_else(|| {
            MurmurError::Engine(format!("non-UTF-8 model path: {}", weights.display()))
        })?;
        let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| MurmurError::Engine(format!("failed to create whisper context: {}", e)))?;
        Ok(Box::new(WhisperModel { ctx }))
    }
}

#[cfg(feature = "whisper")]
struct WhisperModel {
    ctx: whisper_rs::WhisperContext,
}

#[cfg(feature = "whisper")]
impl SpeechModel for WhisperModel {
    fn transcribe(
        &self,
        samples: &[f32],
        options: &TranscribeOptions,
        on_segment: &mut dyn FnMut(&Segment),
    ) -> Result<()> {
        use whisper_rs::{FullParams, SamplingStrategy};

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| MurmurError::Transcription(format!("failed to create state: {}", e)))?;

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: options.beam_size as i32,
            patience: -1.0,
        });
        params.set_language(options.language.as_deref());
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| MurmurError::Transcription(format!("decode failed: {}", e)))?;

        let segments = state
            .full_n_segments()
            .map_err(|e| MurmurError::Transcription(format!("segment count: {}", e)))?;
        for i in 0..segments {
            let text = state
                .full_get_segment_text(i)
                .map_err(|e| MurmurError::Transcription(format!("segment text: {}", e)))?;
            let t0 = state
                .full_get_segment_t0(i)
                .map_err(|e| MurmurError::Transcription(format!("segment start: {}", e)))?;
            let t1 = state
                .full_get_segment_t1(i)
                .map_err(|e| MurmurError::Transcription(format!("segment end: {}", e)))?;
            // Timestamps arrive in centiseconds.
            on_segment(&Segment {
                start: t0 as f64 / 100.0,
                end: t1 as f64 / 100.0,
                text,
            });
        }
        Ok(())
    }
}

#[cfg(not(feature = "whisper"))]
impl SpeechBackend for WhisperBackend {
    fn load_model(&self, _weights: &Path) -> Result<Box<dyn SpeechModel>> {
        Err(MurmurError::Engine(
            "whisper support is not compiled in; rebuild with the whisper feature".to_string(),
        ))
    }
}

#[cfg(all(test, not(feature = "whisper")))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_stub_backend_refuses_to_load() {
        let backend = WhisperBackend::new();
        let result = backend.load_model(&PathBuf::from("/models/tiny/model.bin"));
        assert!(result.is_err());
        let message = result.err().unwrap().to_string();
        assert!(message.contains("whisper feature"));
    }
}
