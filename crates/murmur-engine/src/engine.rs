//! Model lifecycle and transcription.
//!
//! [`TranscriptionEngine`] owns at most one resident speech model. `load`
//! fetches missing weights through the [`ModelStore`], hands them to the
//! [`SpeechBackend`], and swaps the result in; `transcribe` runs inference
//! against whatever is resident and reports per-segment progress.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use murmur_core::{MurmurError, Result, SAMPLE_RATE};
use murmur_hub::ModelStore;

use crate::backend::{SpeechBackend, SpeechModel, TranscribeOptions};
use crate::state::EngineState;

/// What currently occupies the engine. The resident model lives inside the
/// variant, so there is no way to observe "loaded" without a model being
/// present.
enum Slot {
    Unloaded,
    Loading(String),
    Loaded {
        model_id: String,
        model: Box<dyn SpeechModel>,
    },
}

impl Slot {
    fn snapshot(&self) -> EngineState {
        match self {
            Slot::Unloaded => EngineState::Unloaded,
            Slot::Loading(id) => EngineState::Loading(id.clone()),
            Slot::Loaded { model_id, .. } => EngineState::Loaded(model_id.clone()),
        }
    }
}

pub struct TranscriptionEngine {
    store: Arc<ModelStore>,
    backend: Arc<dyn SpeechBackend>,
    options: TranscribeOptions,
    slot: Mutex<Slot>,
}

impl TranscriptionEngine {
    pub fn new(store: Arc<ModelStore>, backend: Arc<dyn SpeechBackend>) -> Self {
        TranscriptionEngine {
            store,
            backend,
            options: TranscribeOptions::default(),
            slot: Mutex::new(Slot::Unloaded),
        }
    }

    /// Replaces the decoding options applied to every transcription.
    pub fn with_options(mut self, options: TranscribeOptions) -> Self {
        self.options = options;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slot>> {
        self.slot
            .lock()
            .map_err(|e| MurmurError::Engine(format!("engine state mutex poisoned: {}", e)))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.slot
            .lock()
            .map(|slot| slot.snapshot())
            .unwrap_or(EngineState::Unloaded)
    }

    /// Whether a model is resident and ready to transcribe.
    pub fn is_loaded(&self) -> bool {
        self.state().is_loaded()
    }

    /// Id of the resident model, if any.
    pub fn loaded_model(&self) -> Option<String> {
        match self.state() {
            EngineState::Loaded(id) => Some(id),
            _ => None,
        }
    }

    /// Points the engine at `model_id` without loading it. A different
    /// resident (or currently loading) model is discarded, so transcription
    /// fails with `NotLoaded` until the next successful
    /// [`load`](Self::load). A matching id is a no-op.
    pub fn set_model(&self, model_id: &str) -> Result<()> {
        let mut slot = self.lock()?;
        let differs = match &*slot {
            Slot::Loaded {
                model_id: current, ..
            }
            | Slot::Loading(current) => current != model_id,
            Slot::Unloaded => false,
        };
        if differs {
            info!(model = %model_id, "Discarding resident model for new selection");
            *slot = Slot::Unloaded;
        }
        Ok(())
    }

    /// Loads `model_id`, downloading its files first when they are not
    /// cached. Always performs a fresh load, even for the already resident
    /// model.
    ///
    /// `on_progress` receives `(percent, message)` reports: the download
    /// phase forwards [`ModelStore::download`] reports unchanged, then the
    /// load phase reports `0.0` when the weights start reading and `100.0`
    /// once the model is in.
    pub fn load(&self, model_id: &str, mut on_progress: impl FnMut(f64, &str)) -> Result<()> {
        {
            let mut slot = self.lock()?;
            // Only one model stays resident at a time, so the previous one
            // is dropped before the new weights come in.
            *slot = Slot::Loading(model_id.to_string());
        }
        info!(model = %model_id, "Loading model");

        match self.load_inner(model_id, &mut on_progress) {
            Ok(model) => {
                let mut slot = self.lock()?;
                if !matches!(&*slot, Slot::Loading(id) if id == model_id) {
                    warn!(model = %model_id, "Discarding superseded model load");
                    return Err(MurmurError::Engine(format!(
                        "Load of {} was superseded",
                        model_id
                    )));
                }
                *slot = Slot::Loaded {
                    model_id: model_id.to_string(),
                    model,
                };
                drop(slot);
                on_progress(100.0, "Model loaded successfully");
                info!(model = %model_id, "Model loaded");
                Ok(())
            }
            Err(e) => {
                let mut slot = self.lock()?;
                if matches!(&*slot, Slot::Loading(id) if id == model_id) {
                    *slot = Slot::Unloaded;
                }
                Err(e)
            }
        }
    }

    fn load_inner(
        &self,
        model_id: &str,
        on_progress: &mut impl FnMut(f64, &str),
    ) -> Result<Box<dyn SpeechModel>> {
        if !self.store.is_downloaded(model_id) {
            info!(model = %model_id, "Model not cached, downloading");
            self.store.download(model_id, &mut *on_progress)?;
        }
        let weights = self.store.weights_path(model_id).ok_or_else(|| {
            MurmurError::Engine(format!("Model files missing after download: {}", model_id))
        })?;
        on_progress(0.0, "Loading model into memory...");
        self.backend.load_model(&weights)
    }

    /// Transcribes 16 kHz mono PCM samples into text.
    ///
    /// Empty input yields an empty string without touching the backend.
    /// `on_progress` receives `(percent, audio_duration_secs)` once per
    /// decoded segment, where percent is how far into the audio the segment
    /// ends, plus a final `100.0` report when decoding finishes. Segment
    /// texts are trimmed and joined with single spaces.
    pub fn transcribe(
        &self,
        samples: &[f32],
        mut on_progress: impl FnMut(f64, f64),
    ) -> Result<String> {
        // The slot stays locked across inference so the model cannot be
        // unloaded out from under the backend mid-run.
        let slot = self.lock()?;
        let model = match &*slot {
            Slot::Loaded { model, .. } => model,
            _ => return Err(MurmurError::NotLoaded),
        };
        if samples.is_empty() {
            return Ok(String::new());
        }

        let duration = samples.len() as f64 / SAMPLE_RATE as f64;
        info!(
            samples = samples.len(),
            duration_secs = duration,
            "Starting transcription"
        );

        let mut parts: Vec<String> = Vec::new();
        model.transcribe(samples, &self.options, &mut |segment| {
            let percent = (segment.end / duration * 100.0).min(100.0);
            on_progress(percent, duration);
            parts.push(segment.text.trim().to_string());
        })?;
        on_progress(100.0, duration);

        let text = parts.join(" ");
        info!(chars = text.len(), "Transcription finished");
        Ok(text)
    }
}
