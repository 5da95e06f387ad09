use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MurmurError, Result};
use crate::settings::SettingsStore;

/// File name of the per-model performance history document.
pub const STATS_FILE: &str = "transcription_stats.json";

/// Number of most-recent samples retained per model.
const MAX_SAMPLES: usize = 20;

/// One completed transcription: how much audio went in, how long it took.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionSample {
    pub audio_duration: f64,
    pub transcription_time: f64,
}

/// Rolling performance record for one model.
///
/// `avg_ratio` is recomputed over the full retained window on every insert,
/// which is cheap because the window never exceeds [`MAX_SAMPLES`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelHistory {
    pub samples: Vec<TranscriptionSample>,
    pub avg_ratio: f64,
}

impl ModelHistory {
    fn total_audio(&self) -> f64 {
        self.samples.iter().map(|s| s.audio_duration).sum()
    }

    fn push(&mut self, sample: TranscriptionSample) {
        self.samples.push(sample);
        if self.samples.len() > MAX_SAMPLES {
            let excess = self.samples.len() - MAX_SAMPLES;
            self.samples.drain(..excess);
        }
        let total_audio = self.total_audio();
        let total_time: f64 = self.samples.iter().map(|s| s.transcription_time).sum();
        self.avg_ratio = if total_audio > 0.0 {
            total_time / total_audio
        } else {
            0.0
        };
    }
}

/// Fallback processing-time ratio (transcription seconds per audio second)
/// for a model with no recorded history. Unrecognized ids assume real-time.
pub fn default_ratio(model_id: &str) -> f64 {
    match model_id {
        "tiny" => 0.3,
        "base" => 0.5,
        "small" => 1.0,
        "medium" => 2.5,
        "large-v3" => 5.0,
        _ => 1.0,
    }
}

/// Predicts transcription time from per-model history, durable across runs.
///
/// Estimates improve over the application's lifetime as real completions are
/// recorded on the user's specific hardware.
pub struct PerformanceEstimator {
    store: Arc<dyn SettingsStore>,
    histories: Mutex<HashMap<String, ModelHistory>>,
}

impl PerformanceEstimator {
    /// Create an estimator backed by the given store, loading any previously
    /// recorded history. A missing or corrupt document starts empty.
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        let histories = match store.read(STATS_FILE) {
            Ok(Some(contents)) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Failed to parse {}: {}. Starting empty.", STATS_FILE, e);
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!("Failed to read {}: {}. Starting empty.", STATS_FILE, e);
                HashMap::new()
            }
        };
        Self {
            store,
            histories: Mutex::new(histories),
        }
    }

    /// Expected transcription time in seconds for `audio_duration` seconds of
    /// audio on `model_id`.
    ///
    /// Uses the recorded average ratio when usable history exists; otherwise
    /// falls back to the per-model default table. A history whose samples sum
    /// to zero audio counts as unusable, which also keeps the ratio
    /// computation free of division by zero.
    pub fn estimate(&self, model_id: &str, audio_duration: f64) -> f64 {
        let histories = self.histories.lock().expect("stats mutex poisoned");
        let ratio = match histories.get(model_id) {
            Some(h) if !h.samples.is_empty() && h.total_audio() > 0.0 => h.avg_ratio,
            _ => default_ratio(model_id),
        };
        audio_duration * ratio
    }

    /// Record a completed transcription and persist the updated history.
    pub fn record(&self, model_id: &str, audio_duration: f64, transcription_time: f64) -> Result<()> {
        let snapshot = {
            let mut histories = self
                .histories
                .lock()
                .map_err(|e| MurmurError::Settings(format!("Stats mutex poisoned: {}", e)))?;
            let history = histories.entry(model_id.to_string()).or_default();
            history.push(TranscriptionSample {
                audio_duration,
                transcription_time,
            });
            debug!(
                model = %model_id,
                samples = history.samples.len(),
                avg_ratio = history.avg_ratio,
                "Transcription time recorded"
            );
            histories.clone()
        };
        let contents = serde_json::to_string_pretty(&snapshot)?;
        self.store.write(STATS_FILE, &contents)?;
        Ok(())
    }

    /// Snapshot of the history for one model, if any samples were recorded.
    pub fn history(&self, model_id: &str) -> Option<ModelHistory> {
        self.histories
            .lock()
            .expect("stats mutex poisoned")
            .get(model_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemoryStore;

    fn estimator() -> PerformanceEstimator {
        PerformanceEstimator::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_default_ratios() {
        assert_eq!(default_ratio("tiny"), 0.3);
        assert_eq!(default_ratio("base"), 0.5);
        assert_eq!(default_ratio("small"), 1.0);
        assert_eq!(default_ratio("medium"), 2.5);
        assert_eq!(default_ratio("large-v3"), 5.0);
        assert_eq!(default_ratio("mystery-model"), 1.0);
    }

    #[test]
    fn test_estimate_without_history_uses_default_table() {
        let est = estimator();
        assert!((est.estimate("base", 10.0) - 5.0).abs() < 1e-9);
        assert!((est.estimate("tiny", 10.0) - 3.0).abs() < 1e-9);
        assert!((est.estimate("unknown", 10.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_improves_after_recording() {
        let est = estimator();
        assert!((est.estimate("base", 10.0) - 5.0).abs() < 1e-9);

        est.record("base", 10.0, 4.0).unwrap();
        assert!((est.estimate("base", 10.0) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_ratio_over_multiple_samples() {
        let est = estimator();
        est.record("base", 10.0, 5.0).unwrap();
        est.record("base", 20.0, 10.0).unwrap();

        let history = est.history("base").unwrap();
        assert_eq!(history.samples.len(), 2);
        assert!((history.avg_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_history_capped_at_twenty_most_recent() {
        let est = estimator();
        for i in 0..25 {
            est.record("tiny", 1.0, i as f64).unwrap();
        }

        let history = est.history("tiny").unwrap();
        assert_eq!(history.samples.len(), 20);
        // Oldest five evicted; the window starts at the sixth insert.
        assert_eq!(history.samples[0].transcription_time, 5.0);
        assert_eq!(history.samples[19].transcription_time, 24.0);

        let expected: f64 = (5..25).sum::<usize>() as f64 / 20.0;
        assert!((history.avg_ratio - expected).abs() < 1e-9);
    }

    #[test]
    fn test_zero_duration_estimate_is_finite() {
        let est = estimator();
        let value = est.estimate("base", 0.0);
        assert!(value.is_finite());
        assert!(value >= 0.0);
    }

    #[test]
    fn test_zero_audio_history_falls_back_to_default() {
        let est = estimator();
        est.record("base", 0.0, 3.0).unwrap();
        // Recorded history has no usable audio, so the default ratio applies.
        assert!((est.estimate("base", 10.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_history_is_durable_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let est = PerformanceEstimator::new(Arc::new(crate::settings::FsStore::new(dir.path())));
            est.record("small", 10.0, 8.0).unwrap();
        }

        let est = PerformanceEstimator::new(Arc::new(crate::settings::FsStore::new(dir.path())));
        assert!((est.estimate("small", 10.0) - 8.0).abs() < 1e-9);
        assert_eq!(est.history("small").unwrap().samples.len(), 1);
    }

    #[test]
    fn test_corrupt_stats_document_starts_empty() {
        let store = MemoryStore::new().with_doc(STATS_FILE, "not json at all");
        let est = PerformanceEstimator::new(Arc::new(store));
        assert!(est.history("base").is_none());
        assert!((est.estimate("base", 10.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_histories_are_per_model() {
        let est = estimator();
        est.record("tiny", 10.0, 2.0).unwrap();
        est.record("base", 10.0, 6.0).unwrap();

        assert!((est.estimate("tiny", 10.0) - 2.0).abs() < 1e-9);
        assert!((est.estimate("base", 10.0) - 6.0).abs() < 1e-9);
    }
}
