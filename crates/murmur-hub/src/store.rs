use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use murmur_core::error::Result;
use murmur_core::fmt::format_bytes;

use crate::catalog;
use crate::client::{HubFile, ModelHub};

/// File every complete snapshot must contain.
const PRIMARY_WEIGHTS_FILE: &str = "model.bin";

/// Snapshot directory used for downloads performed by this store.
const SNAPSHOT_NAME: &str = "main";

/// Progress cap while a download is still in flight. Exactly 100 is reserved
/// for the terminal completion report.
const MIDFLIGHT_CAP: f64 = 99.9;

/// Byte-accurate accounting for one download, created inside a single
/// [`ModelStore::download`] call and dropped when it returns.
///
/// `completed_bytes` only ever grows: each finished file folds its manifest
/// size in, including files the transfer layer skipped as cache hits, so an
/// all-cached re-download still walks to completion instead of stalling.
/// Reported percentages are additionally clamped to be non-decreasing, which
/// covers manifests whose size metadata undercounts the actual transfer.
#[derive(Debug)]
pub struct DownloadSession {
    model_id: String,
    total_bytes: u64,
    completed_bytes: u64,
    current_file_name: String,
    current_file_size: u64,
    current_file_started: bool,
    last_percent: f64,
}

impl DownloadSession {
    fn new(model_id: &str, total_bytes: u64) -> Self {
        Self {
            model_id: model_id.to_string(),
            total_bytes,
            completed_bytes: 0,
            current_file_name: String::new(),
            current_file_size: 0,
            current_file_started: false,
            last_percent: 0.0,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn begin_file(&mut self, file: &HubFile) {
        self.current_file_name = file.name.clone();
        self.current_file_size = file.size;
        self.current_file_started = false;
    }

    /// Record cumulative in-flight bytes for the current file and return the
    /// overall percentage to report.
    fn transfer(&mut self, file_bytes: u64) -> f64 {
        self.current_file_started = true;
        self.report(file_bytes)
    }

    /// Credit the current file as complete. Returns `true` when the transfer
    /// layer never moved a byte (cache hit).
    fn finish_file(&mut self) -> bool {
        self.completed_bytes = self.completed_bytes.saturating_add(self.current_file_size);
        !std::mem::replace(&mut self.current_file_started, false)
    }

    fn report(&mut self, in_flight: u64) -> f64 {
        let done = self.completed_bytes.saturating_add(in_flight);
        let percent = if self.total_bytes == 0 {
            0.0
        } else {
            (100.0 * done as f64 / self.total_bytes as f64).min(MIDFLIGHT_CAP)
        };
        self.last_percent = self.last_percent.max(percent);
        self.last_percent
    }

    fn message(&self, in_flight: u64) -> String {
        format!(
            "Downloading {} ({}/{})",
            self.current_file_name,
            format_bytes(self.completed_bytes.saturating_add(in_flight)),
            format_bytes(self.total_bytes)
        )
    }
}

/// Maps model ids to on-disk cache locations, answers "is this model fully
/// present?", and performs downloads with byte-level progress.
///
/// The cache layout is the hub convention the speech runtime expects: one
/// `models--<org>--<name>` directory per model, holding a `snapshots`
/// directory whose subdirectories each contain the model files.
pub struct ModelStore {
    models_dir: PathBuf,
    hub: Arc<dyn ModelHub>,
}

impl ModelStore {
    pub fn new(models_dir: impl Into<PathBuf>, hub: Arc<dyn ModelHub>) -> Self {
        Self {
            models_dir: models_dir.into(),
            hub,
        }
    }

    /// Root directory holding all model caches.
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Cache directory name for a hub repository
    /// (`Systran/faster-whisper-base` -> `models--Systran--faster-whisper-base`).
    pub fn cache_dir_name(repo: &str) -> String {
        format!("models--{}", repo.replace('/', "--"))
    }

    /// Cache directory for one model.
    pub fn model_path(&self, model_id: &str) -> PathBuf {
        self.models_dir
            .join(Self::cache_dir_name(catalog::repo_for(model_id)))
    }

    /// Whether the model's cache contains at least one snapshot with the
    /// primary weights file. Purely filesystem metadata, cheap enough to
    /// poll on every selector render.
    pub fn is_downloaded(&self, model_id: &str) -> bool {
        let snapshots = self.model_path(model_id).join("snapshots");
        let Ok(entries) = std::fs::read_dir(&snapshots) else {
            return false;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && path.join(PRIMARY_WEIGHTS_FILE).exists() {
                return true;
            }
        }
        false
    }

    /// Path to the snapshot directory containing the weights, if downloaded.
    pub fn snapshot_path(&self, model_id: &str) -> Option<PathBuf> {
        let snapshots = self.model_path(model_id).join("snapshots");
        let entries = std::fs::read_dir(&snapshots).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && path.join(PRIMARY_WEIGHTS_FILE).exists() {
                return Some(path);
            }
        }
        None
    }

    /// Path to the primary weights file inside the active snapshot, if
    /// downloaded.
    pub fn weights_path(&self, model_id: &str) -> Option<PathBuf> {
        self.snapshot_path(model_id)
            .map(|dir| dir.join(PRIMARY_WEIGHTS_FILE))
    }

    /// Download every file in the model's manifest, smallest files first so
    /// visible progress starts quickly.
    ///
    /// `on_progress` receives `(percent, message)` pairs: monotonically
    /// non-decreasing values capped at 99.9 while in flight, exactly 100.0
    /// once on success, or the -1.0 sentinel (hide progress display) followed
    /// by an `Err` return on failure. At most one download should run per
    /// store at a time; the caller's state machine enforces that.
    pub fn download(&self, model_id: &str, mut on_progress: impl FnMut(f64, &str)) -> Result<()> {
        match self.download_inner(model_id, &mut on_progress) {
            Ok(()) => {
                on_progress(100.0, &format!("Download complete: {}", model_id));
                Ok(())
            }
            Err(e) => {
                on_progress(-1.0, &format!("Download failed: {}", e));
                Err(e)
            }
        }
    }

    fn download_inner(
        &self,
        model_id: &str,
        on_progress: &mut impl FnMut(f64, &str),
    ) -> Result<()> {
        on_progress(0.0, &format!("Starting download of {}...", model_id));

        let repo = catalog::repo_for(model_id);
        let mut files = self.hub.list_files(repo)?;
        files.sort_by_key(|f| f.size);

        let total_bytes: u64 = files.iter().map(|f| f.size).sum();
        let snapshot_dir = self
            .model_path(model_id)
            .join("snapshots")
            .join(SNAPSHOT_NAME);
        std::fs::create_dir_all(&snapshot_dir)?;

        info!(
            model = %model_id,
            repo = %repo,
            files = files.len(),
            total_bytes,
            "Model download started"
        );
        on_progress(
            1.0,
            &format!("Found {} files ({})", files.len(), format_bytes(total_bytes)),
        );

        let mut session = DownloadSession::new(model_id, total_bytes);
        // Keep later clamped reports from dipping below the lead-in value.
        session.last_percent = 1.0;
        for file in &files {
            session.begin_file(file);
            let percent = session.report(0);
            on_progress(percent, &session.message(0));

            self.hub
                .fetch_file(repo, file, &snapshot_dir, &mut |bytes| {
                    let percent = session.transfer(bytes);
                    on_progress(percent, &session.message(bytes));
                })?;

            let cached = session.finish_file();
            if cached {
                debug!(file = %file.name, "File was already cached");
            }
            let percent = session.report(0);
            on_progress(percent, &session.message(0));
        }

        info!(model = %model_id, total_bytes, "Model download finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockHub;

    fn tiny_manifest() -> Vec<HubFile> {
        vec![
            HubFile {
                name: PRIMARY_WEIGHTS_FILE.to_string(),
                size: 700_000,
            },
            HubFile {
                name: "config.json".to_string(),
                size: 300_000,
            },
        ]
    }

    fn store_with(hub: MockHub) -> (tempfile::TempDir, ModelStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path(), Arc::new(hub));
        (dir, store)
    }

    #[test]
    fn test_cache_dir_name_transform() {
        assert_eq!(
            ModelStore::cache_dir_name("Systran/faster-whisper-tiny"),
            "models--Systran--faster-whisper-tiny"
        );
    }

    #[test]
    fn test_is_downloaded_false_on_empty_cache() {
        let (_dir, store) = store_with(MockHub::new());
        assert!(!store.is_downloaded("tiny"));
    }

    #[test]
    fn test_is_downloaded_false_without_weights_file() {
        let (dir, store) = store_with(MockHub::new());
        let snapshot = dir
            .path()
            .join("models--Systran--faster-whisper-tiny")
            .join("snapshots")
            .join("abc123");
        std::fs::create_dir_all(&snapshot).unwrap();
        std::fs::write(snapshot.join("config.json"), "{}").unwrap();

        assert!(!store.is_downloaded("tiny"));
    }

    #[test]
    fn test_is_downloaded_true_with_weights_in_any_snapshot() {
        let (dir, store) = store_with(MockHub::new());
        let snapshot = dir
            .path()
            .join("models--Systran--faster-whisper-tiny")
            .join("snapshots")
            .join("abc123");
        std::fs::create_dir_all(&snapshot).unwrap();
        std::fs::write(snapshot.join(PRIMARY_WEIGHTS_FILE), "weights").unwrap();

        assert!(store.is_downloaded("tiny"));
    }

    #[test]
    fn test_weights_path_points_into_snapshot() {
        let hub = MockHub::new().with_manifest("Systran/faster-whisper-tiny", tiny_manifest());
        let (_dir, store) = store_with(hub);

        assert!(store.weights_path("tiny").is_none());
        store.download("tiny", |_, _| {}).unwrap();

        let weights = store.weights_path("tiny").unwrap();
        assert!(weights.exists());
        assert!(weights.ends_with("model.bin"));
    }

    #[test]
    fn test_download_makes_model_downloaded_and_survives_restart() {
        let hub = MockHub::new().with_manifest("Systran/faster-whisper-tiny", tiny_manifest());
        let (dir, store) = store_with(hub);

        assert!(!store.is_downloaded("tiny"));
        store.download("tiny", |_, _| {}).unwrap();
        assert!(store.is_downloaded("tiny"));

        // A fresh store over the same directory sees the same cache.
        let restarted = ModelStore::new(dir.path(), Arc::new(MockHub::new()));
        assert!(restarted.is_downloaded("tiny"));
    }

    #[test]
    fn test_download_order_and_scenario_percentages() {
        let hub = Arc::new(
            MockHub::new()
                .with_manifest("Systran/faster-whisper-tiny", tiny_manifest())
                .with_chunk_size(100_000),
        );
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path(), Arc::clone(&hub) as Arc<dyn ModelHub>);

        let mut reports: Vec<f64> = Vec::new();
        store
            .download("tiny", |pct, _msg| reports.push(pct))
            .unwrap();

        // Smallest file first.
        assert_eq!(
            hub.fetched(),
            vec!["config.json".to_string(), PRIMARY_WEIGHTS_FILE.to_string()]
        );

        // After the 300,000-byte file completes, progress sits at 30%.
        assert!(reports.iter().any(|p| (p - 30.0).abs() < 1e-9));

        // Monotonically non-decreasing, capped at 99.9 until the final 100.
        for pair in reports.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        let (last, mid) = reports.split_last().unwrap();
        assert_eq!(*last, 100.0);
        for p in mid {
            assert!(*p <= 99.9);
        }
    }

    #[test]
    fn test_download_messages() {
        let hub = MockHub::new()
            .with_manifest("Systran/faster-whisper-tiny", tiny_manifest())
            .with_chunk_size(250_000);
        let (_dir, store) = store_with(hub);

        let mut reports: Vec<(f64, String)> = Vec::new();
        store
            .download("tiny", |pct, msg| reports.push((pct, msg.to_string())))
            .unwrap();

        assert_eq!(reports[0].0, 0.0);
        assert!(reports[0].1.starts_with("Starting download of tiny"));
        assert_eq!(reports[1].0, 1.0);
        assert_eq!(reports[1].1, "Found 2 files (976.6 KB)");
        assert!(reports
            .iter()
            .any(|(_, m)| m.starts_with("Downloading config.json (")));
        assert_eq!(reports.last().unwrap().1, "Download complete: tiny");
    }

    #[test]
    fn test_download_failure_reports_sentinel_and_propagates() {
        let hub = MockHub::new()
            .with_manifest("Systran/faster-whisper-tiny", tiny_manifest())
            .with_fetch_failure(PRIMARY_WEIGHTS_FILE);
        let (_dir, store) = store_with(hub);

        let mut reports: Vec<f64> = Vec::new();
        let result = store.download("tiny", |pct, _| reports.push(pct));

        assert!(result.is_err());
        assert_eq!(*reports.last().unwrap(), -1.0);
        // The failed model must not read as downloaded.
        assert!(!store.is_downloaded("tiny"));
    }

    #[test]
    fn test_download_listing_failure_reports_sentinel() {
        let hub = MockHub::new().with_listing_failure();
        let (_dir, store) = store_with(hub);

        let mut reports: Vec<(f64, String)> = Vec::new();
        let result = store.download("tiny", |pct, msg| reports.push((pct, msg.to_string())));

        assert!(result.is_err());
        let (pct, msg) = reports.last().unwrap();
        assert_eq!(*pct, -1.0);
        assert!(msg.contains("Download failed"));
    }

    #[test]
    fn test_all_cached_redownload_still_reaches_100() {
        let hub = MockHub::new().with_manifest("Systran/faster-whisper-tiny", tiny_manifest());
        let (dir, store) = store_with(hub);
        store.download("tiny", |_, _| {}).unwrap();

        // Second pass: every file is a cache hit, so no transfer callbacks
        // fire, yet crediting at file completion walks progress to the end.
        let hub = MockHub::new().with_manifest("Systran/faster-whisper-tiny", tiny_manifest());
        let store = ModelStore::new(dir.path(), Arc::new(hub));
        let mut reports: Vec<f64> = Vec::new();
        store.download("tiny", |pct, _| reports.push(pct)).unwrap();

        assert_eq!(*reports.last().unwrap(), 100.0);
        assert!(reports.iter().any(|p| (p - 30.0).abs() < 1e-9));
    }

    #[test]
    fn test_download_with_missing_size_metadata() {
        let hub = MockHub::new().with_manifest(
            "Systran/faster-whisper-tiny",
            vec![
                HubFile {
                    name: PRIMARY_WEIGHTS_FILE.to_string(),
                    size: 500,
                },
                // The hub reported no size for this file.
                HubFile {
                    name: "tokenizer.json".to_string(),
                    size: 0,
                },
            ],
        );
        let (_dir, store) = store_with(hub);

        let mut reports: Vec<f64> = Vec::new();
        store.download("tiny", |pct, _| reports.push(pct)).unwrap();

        for pair in reports.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert_eq!(*reports.last().unwrap(), 100.0);
    }

    #[test]
    fn test_unknown_id_is_treated_as_repo_path() {
        let hub = MockHub::new().with_manifest(
            "someorg/custom",
            vec![HubFile {
                name: PRIMARY_WEIGHTS_FILE.to_string(),
                size: 10,
            }],
        );
        let (_dir, store) = store_with(hub);

        store.download("someorg/custom", |_, _| {}).unwrap();
        assert!(store.is_downloaded("someorg/custom"));
    }
}
