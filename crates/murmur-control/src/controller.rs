//! The dictation lifecycle controller.
//!
//! One structure owns every state write: hotkey presses, worker completions,
//! and progress ticks all funnel into [`LifecycleController::run`], which
//! applies them in arrival order. Long-running work (model loads, downloads,
//! inference, typing) happens on blocking worker tasks that report back over
//! a channel and never touch state themselves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use murmur_audio::CaptureSession;
use murmur_core::{
    AppState, MurmurError, Notification, PerformanceEstimator, Result, Settings, SettingsStore,
    Timestamp,
};
use murmur_engine::TranscriptionEngine;
use murmur_hub::ModelStore;

use crate::hotkey::{display_combo, HotkeyBackend};
use crate::inject::TextInjector;
use crate::message::WorkerMessage;
use crate::progress::EtaTracker;
use crate::state::StateCell;

/// Pause after a recoverable failure before returning to service.
const RECOVERY_DELAY: Duration = Duration::from_secs(2);

/// Interval between transcription progress reports.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// ETA tracking for the transcription currently in flight.
struct ProgressRun {
    tracker: EtaTracker,
    started: Instant,
}

pub struct LifecycleController {
    state: StateCell,
    engine: Arc<TranscriptionEngine>,
    store: Arc<ModelStore>,
    capture: Arc<CaptureSession>,
    hotkeys: Arc<dyn HotkeyBackend>,
    injector: Arc<dyn TextInjector>,
    estimator: PerformanceEstimator,
    settings_store: Arc<dyn SettingsStore>,
    hotkey_combo: String,
    selected: Mutex<String>,
    downloading: Mutex<Option<String>>,
    progress: Mutex<Option<ProgressRun>>,
    worker_tx: UnboundedSender<WorkerMessage>,
    worker_rx: Mutex<Option<UnboundedReceiver<WorkerMessage>>>,
    notify_tx: UnboundedSender<Notification>,
    alive: AtomicBool,
    stop: Notify,
}

impl LifecycleController {
    /// Builds the controller and hands back the notification stream its
    /// observers consume. The selected model comes from persisted settings.
    pub fn new(
        engine: Arc<TranscriptionEngine>,
        store: Arc<ModelStore>,
        capture: CaptureSession,
        hotkeys: Arc<dyn HotkeyBackend>,
        injector: Arc<dyn TextInjector>,
        settings_store: Arc<dyn SettingsStore>,
        hotkey_combo: &str,
    ) -> (Arc<Self>, UnboundedReceiver<Notification>) {
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        let settings = Settings::load_or_default(settings_store.as_ref());

        let level_tx = worker_tx.clone();
        let capture = capture.with_level_fn(move |level| {
            let _ = level_tx.send(WorkerMessage::AudioLevel { level });
        });

        let controller = Arc::new(Self {
            state: StateCell::new(),
            engine,
            store,
            capture: Arc::new(capture),
            hotkeys,
            injector,
            estimator: PerformanceEstimator::new(Arc::clone(&settings_store)),
            settings_store,
            hotkey_combo: hotkey_combo.to_string(),
            selected: Mutex::new(settings.selected_model),
            downloading: Mutex::new(None),
            progress: Mutex::new(None),
            worker_tx,
            worker_rx: Mutex::new(Some(worker_rx)),
            notify_tx,
            alive: AtomicBool::new(true),
            stop: Notify::new(),
        });
        (controller, notify_rx)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AppState {
        self.state.current()
    }

    /// Id of the model the user has selected.
    pub fn selected_model(&self) -> String {
        self.selected.lock().expect("state mutex poisoned").clone()
    }

    /// Whether a model download is currently in flight.
    pub fn is_downloading(&self) -> bool {
        self.downloading
            .lock()
            .expect("state mutex poisoned")
            .is_some()
    }

    fn notify(&self, notification: Notification) {
        let _ = self.notify_tx.send(notification);
    }

    fn notify_error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(error = %message, "Lifecycle error");
        self.notify(Notification::ErrorOccurred {
            message,
            timestamp: Timestamp::now(),
        });
    }

    /// Applies a validated transition and announces it with a status line.
    /// An invalid edge is dropped with a warning and no notification.
    fn set_state(&self, target: AppState, message: impl Into<String>) {
        match self.state.transition(target) {
            Ok(()) => self.notify(Notification::StateChanged {
                state: target,
                message: message.into(),
                timestamp: Timestamp::now(),
            }),
            Err(e) => warn!(error = %e, "Dropping state change"),
        }
    }

    /// Registers the global hotkey, then starts loading the selected model
    /// if its files are already on disk. With no usable model the controller
    /// settles in `NoModel` and waits for a download.
    pub fn initialize(self: &Arc<Self>) -> Result<()> {
        let tx = self.worker_tx.clone();
        self.hotkeys.register(
            &self.hotkey_combo,
            Box::new(move || {
                let _ = tx.send(WorkerMessage::HotkeyPressed);
            }),
        )?;

        let model_id = self.selected_model();
        if self.store.is_downloaded(&model_id) {
            // Already in Loading, the initial state; just announce it.
            self.notify(Notification::StateChanged {
                state: AppState::Loading,
                message: format!("Loading {} model...", model_id),
                timestamp: Timestamp::now(),
            });
            self.spawn_load(model_id);
        } else {
            self.set_state(
                AppState::NoModel,
                format!(
                    "Model '{}' not downloaded. Select a model to download.",
                    model_id
                ),
            );
        }
        Ok(())
    }

    /// Switches to a different model, which must already be downloaded.
    ///
    /// Selecting the model that is already resident is a no-op. While a
    /// recording, transcription, typing run, download, or load is in flight
    /// the switch is refused.
    pub fn select_model(self: &Arc<Self>, model_id: &str) -> Result<()> {
        if self.selected_model() == model_id && self.engine.loaded_model().as_deref() == Some(model_id)
        {
            debug!(model = %model_id, "Model already active");
            return Ok(());
        }

        if !self.state().accepts_model_change() {
            let message = "Cannot change model while busy. Please wait.";
            self.notify_error(message);
            return Err(MurmurError::Busy(message.to_string()));
        }

        if !self.store.is_downloaded(model_id) {
            let err = MurmurError::NotDownloaded(model_id.to_string());
            self.notify_error(err.to_string());
            return Err(err);
        }

        // Claim the Loading state; a concurrent operation that got there
        // first turns this into the same busy refusal.
        if self.state.transition(AppState::Loading).is_err() {
            let message = "Cannot change model while busy. Please wait.";
            self.notify_error(message);
            return Err(MurmurError::Busy(message.to_string()));
        }

        *self.selected.lock().expect("state mutex poisoned") = model_id.to_string();
        // Drop the old model right away instead of holding both across the
        // async load.
        if let Err(e) = self.engine.set_model(model_id) {
            warn!(error = %e, "Failed to reset engine for new model");
        }
        let mut settings = Settings::load_or_default(self.settings_store.as_ref());
        settings.selected_model = model_id.to_string();
        if let Err(e) = settings.save(self.settings_store.as_ref()) {
            warn!(error = %e, "Failed to persist model selection");
        }

        self.notify(Notification::StateChanged {
            state: AppState::Loading,
            message: format!("Loading {} model...", model_id),
            timestamp: Timestamp::now(),
        });
        self.spawn_load(model_id.to_string());
        Ok(())
    }

    /// Starts downloading a model's files in the background.
    ///
    /// Completion does not load the model; it returns the lifecycle to
    /// `Idle` (model still resident) or `NoModel` (nothing loaded yet) and
    /// leaves selection to the user.
    pub fn start_download(self: &Arc<Self>, model_id: &str) -> Result<()> {
        let refusal = {
            let mut downloading = self.downloading.lock().expect("state mutex poisoned");
            if let Some(active) = &*downloading {
                Some(MurmurError::DownloadInProgress(active.clone()))
            } else if self.store.is_downloaded(model_id) {
                Some(MurmurError::AlreadyDownloaded(model_id.to_string()))
            } else if let Err(e) = self.state.transition(AppState::Downloading) {
                Some(e)
            } else {
                *downloading = Some(model_id.to_string());
                None
            }
        };
        if let Some(err) = refusal {
            self.notify_error(err.to_string());
            return Err(err);
        }

        self.notify(Notification::StateChanged {
            state: AppState::Downloading,
            message: format!("Downloading {}...", model_id),
            timestamp: Timestamp::now(),
        });
        self.spawn_download(model_id.to_string());
        Ok(())
    }

    /// Push-to-talk toggle, normally fired by the registered hotkey.
    pub fn hotkey_pressed(self: &Arc<Self>) {
        match self.state() {
            AppState::Idle => self.begin_recording(),
            AppState::Recording => self.finish_recording(),
            AppState::NoModel => {
                self.notify_error("No model loaded. Please select and download a model first.");
            }
            state => debug!(state = %state, "Ignoring hotkey"),
        }
    }

    /// Unregisters the hotkey, discards any in-flight capture, and stops the
    /// run loop. Workers already running may finish, but their results are
    /// no longer applied.
    pub fn shutdown(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down");
        if let Err(e) = self.hotkeys.unregister() {
            warn!(error = %e, "Failed to unregister hotkey");
        }
        if self.capture.is_capturing() {
            if let Err(e) = self.capture.stop() {
                warn!(error = %e, "Failed to stop capture during shutdown");
            }
        }
        self.stop.notify_one();
    }

    /// Drives the controller until [`shutdown`](Self::shutdown). Must be
    /// called exactly once.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let mut rx = self
            .worker_rx
            .lock()
            .expect("state mutex poisoned")
            .take()
            .ok_or_else(|| MurmurError::Busy("controller run loop already started".to_string()))?;

        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(message) if self.alive.load(Ordering::SeqCst) => self.handle(message),
                    Some(_) => {}
                    None => break,
                },
                _ = ticker.tick() => self.tick_progress(),
                _ = self.stop.notified() => break,
            }
        }
        Ok(())
    }

    fn handle(self: &Arc<Self>, message: WorkerMessage) {
        match message {
            WorkerMessage::HotkeyPressed => self.hotkey_pressed(),
            WorkerMessage::AudioLevel { level } => self.notify(Notification::AudioLevel {
                level,
                timestamp: Timestamp::now(),
            }),
            WorkerMessage::LoadProgress {
                model_id,
                percent,
                message,
            }
            | WorkerMessage::DownloadProgress {
                model_id,
                percent,
                message,
            } => self.notify(Notification::DownloadProgress {
                model_id,
                percent,
                message,
                timestamp: Timestamp::now(),
            }),
            WorkerMessage::LoadFinished { model_id, result } => self.finish_load(model_id, result),
            WorkerMessage::DownloadFinished { model_id, result } => {
                self.finish_download(model_id, result)
            }
            WorkerMessage::TranscriptionProgress { percent } => {
                if let Some(run) = self
                    .progress
                    .lock()
                    .expect("state mutex poisoned")
                    .as_mut()
                {
                    run.tracker.observe_segment(percent);
                }
            }
            WorkerMessage::TranscriptionFinished {
                result,
                audio_duration,
                elapsed,
            } => self.finish_transcription(result, audio_duration, elapsed),
            WorkerMessage::TypingFinished { result } => self.finish_typing(result),
        }
    }

    fn begin_recording(self: &Arc<Self>) {
        if !self.engine.is_loaded() {
            self.notify_error("Model not loaded. Please wait or select a model.");
            return;
        }
        if let Err(e) = self.state.transition(AppState::Recording) {
            warn!(error = %e, "Dropping recording start");
            return;
        }
        match self.capture.start() {
            Ok(()) => self.notify(Notification::StateChanged {
                state: AppState::Recording,
                message: format!(
                    "Recording... Press {} to stop",
                    display_combo(&self.hotkey_combo)
                ),
                timestamp: Timestamp::now(),
            }),
            Err(e) => self.enter_error(format!("Failed to start recording: {}", e), true),
        }
    }

    fn finish_recording(self: &Arc<Self>) {
        let samples = match self.capture.stop() {
            Ok(samples) => samples,
            Err(e) => {
                self.enter_error(format!("Failed to stop recording: {}", e), true);
                return;
            }
        };

        if samples.is_empty() {
            self.set_state(AppState::Idle, "No audio recorded. Ready.");
            return;
        }

        let audio_duration = self.capture.duration_secs(&samples);
        let estimate = self.estimator.estimate(&self.selected_model(), audio_duration);
        *self.progress.lock().expect("state mutex poisoned") = Some(ProgressRun {
            tracker: EtaTracker::new(estimate),
            started: Instant::now(),
        });

        self.set_state(AppState::Transcribing, "Transcribing...");
        self.spawn_transcription(samples, audio_duration);
    }

    fn finish_load(self: &Arc<Self>, model_id: String, result: Result<()>) {
        match result {
            Ok(()) => {
                self.set_state(AppState::Idle, "Ready");
                self.notify(Notification::ModelReady {
                    model_id,
                    timestamp: Timestamp::now(),
                });
            }
            // No recovery timer here: a failed load needs a different model,
            // not a retry of the same one.
            Err(e) => self.enter_error(format!("Failed to load model: {}", e), false),
        }
    }

    fn finish_download(self: &Arc<Self>, model_id: String, result: Result<()>) {
        *self.downloading.lock().expect("state mutex poisoned") = None;
        match result {
            Ok(()) => {
                info!(model = %model_id, "Model download finished");
                if self.engine.is_loaded() {
                    self.set_state(
                        AppState::Idle,
                        format!("Model '{}' downloaded. Ready.", model_id),
                    );
                } else {
                    self.set_state(
                        AppState::NoModel,
                        format!("Model '{}' downloaded. Select it to load.", model_id),
                    );
                }
            }
            Err(e) => self.enter_error(format!("Failed to download model: {}", e), false),
        }
    }

    fn finish_transcription(
        self: &Arc<Self>,
        result: Result<String>,
        audio_duration: f64,
        elapsed: f64,
    ) {
        *self.progress.lock().expect("state mutex poisoned") = None;
        match result {
            Ok(text) => {
                if let Err(e) =
                    self.estimator
                        .record(&self.selected_model(), audio_duration, elapsed)
                {
                    warn!(error = %e, "Failed to record transcription stats");
                }
                let text = text.trim().to_string();
                if text.is_empty() {
                    debug!("Transcript empty, skipping typing");
                    self.set_state(AppState::Idle, "Ready");
                    return;
                }
                self.set_state(AppState::Typing, "Typing...");
                self.spawn_typing(text);
            }
            Err(e) => self.enter_error(format!("Transcription failed: {}", e), true),
        }
    }

    fn finish_typing(self: &Arc<Self>, result: Result<()>) {
        match result {
            Ok(()) => self.set_state(AppState::Idle, "Ready"),
            Err(e) => self.enter_error(format!("Typing failed: {}", e), true),
        }
    }

    /// Enters the Error state and surfaces `message`. Recoverable failures
    /// schedule an automatic return to service.
    fn enter_error(self: &Arc<Self>, message: String, recover: bool) {
        if let Err(e) = self.state.transition(AppState::Error) {
            warn!(error = %e, "Dropping error transition");
        }
        self.notify_error(message);
        if recover {
            self.schedule_recovery();
        }
    }

    fn schedule_recovery(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(RECOVERY_DELAY).await;
            controller.recover();
        });
    }

    fn recover(&self) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        if self.state() != AppState::Error {
            debug!("Skipping recovery, state moved on");
            return;
        }
        if self.engine.is_loaded() {
            self.set_state(AppState::Idle, "Ready");
        } else {
            self.set_state(AppState::NoModel, "Select a model to continue.");
        }
    }

    fn tick_progress(&self) {
        if self.state() != AppState::Transcribing {
            return;
        }
        let sample = {
            let mut progress = self.progress.lock().expect("state mutex poisoned");
            progress.as_mut().map(|run| {
                let elapsed = run.started.elapsed().as_secs_f64();
                let (percent, eta) = run.tracker.sample(elapsed);
                (percent, elapsed, eta)
            })
        };
        if let Some((percent, elapsed, eta)) = sample {
            self.notify(Notification::TranscriptionProgress {
                percent,
                elapsed_secs: elapsed,
                eta_secs: eta,
                timestamp: Timestamp::now(),
            });
        }
    }

    fn spawn_load(self: &Arc<Self>, model_id: String) {
        let controller = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let tx = controller.worker_tx.clone();
            let progress_tx = tx.clone();
            let progress_id = model_id.clone();
            let result = controller.engine.load(&model_id, move |percent, message| {
                let _ = progress_tx.send(WorkerMessage::LoadProgress {
                    model_id: progress_id.clone(),
                    percent,
                    message: message.to_string(),
                });
            });
            let _ = tx.send(WorkerMessage::LoadFinished { model_id, result });
        });
    }

    fn spawn_download(self: &Arc<Self>, model_id: String) {
        let controller = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let tx = controller.worker_tx.clone();
            let progress_tx = tx.clone();
            let progress_id = model_id.clone();
            let result = controller.store.download(&model_id, move |percent, message| {
                let _ = progress_tx.send(WorkerMessage::DownloadProgress {
                    model_id: progress_id.clone(),
                    percent,
                    message: message.to_string(),
                });
            });
            let _ = tx.send(WorkerMessage::DownloadFinished { model_id, result });
        });
    }

    fn spawn_transcription(self: &Arc<Self>, samples: Vec<f32>, audio_duration: f64) {
        let controller = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let tx = controller.worker_tx.clone();
            let progress_tx = tx.clone();
            let started = Instant::now();
            let result = controller.engine.transcribe(&samples, move |percent, _total| {
                let _ = progress_tx.send(WorkerMessage::TranscriptionProgress { percent });
            });
            let elapsed = started.elapsed().as_secs_f64();
            let _ = tx.send(WorkerMessage::TranscriptionFinished {
                result,
                audio_duration,
                elapsed,
            });
        });
    }

    fn spawn_typing(self: &Arc<Self>, text: String) {
        let controller = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let result = controller.injector.type_text(&text);
            let _ = controller
                .worker_tx
                .send(WorkerMessage::TypingFinished { result });
        });
    }
}

// Tests
