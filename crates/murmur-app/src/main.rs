//! Murmur application binary - composition root.
//!
//! Ties the Murmur crates together into a single executable:
//! 1. Resolve the data directory and load persisted settings
//! 2. Open the model cache against the Hugging Face hub
//! 3. Build the transcription engine, microphone capture, global hotkey
//!    listener, and keystroke injector
//! 4. Run the lifecycle controller and render its notifications as log lines
//!
//! `murmur models` and `murmur download <id>` are one-shot maintenance
//! commands that skip the controller entirely.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use murmur_audio::{AudioInput, CaptureSession, CpalInput};
use murmur_control::{
    display_combo, EnigoInjector, GlobalHotkeyService, HotkeyBackend, LifecycleController,
    TextInjector,
};
use murmur_core::fmt::format_duration;
use murmur_core::{FsStore, MurmurError, Notification, Settings, SettingsStore, SAMPLE_RATE};
use murmur_engine::{TranscriptionEngine, WhisperBackend};
use murmur_hub::{HttpHub, ModelStore, MODELS};

use cli::{CliArgs, Command};

/// Delay between injected keystrokes. Shorter than the library default;
/// dictated text should land snappily.
const TYPE_INTERVAL: Duration = Duration::from_millis(5);

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Render a controller notification as a log line.
fn render_notification(event: Notification) {
    match event {
        Notification::StateChanged { state, message, .. } => {
            tracing::info!(state = %state, "{}", message)
        }
        Notification::ErrorOccurred { message, .. } => tracing::error!("{}", message),
        Notification::DownloadProgress {
            model_id,
            percent,
            message,
            ..
        } => {
            if percent < 0.0 {
                tracing::warn!(model = %model_id, "{}", message);
            } else {
                tracing::debug!(model = %model_id, percent, "{}", message);
            }
        }
        Notification::ModelReady { model_id, .. } => {
            tracing::info!(model = %model_id, "Model ready")
        }
        Notification::TranscriptionProgress {
            percent,
            elapsed_secs,
            eta_secs,
            ..
        } => tracing::debug!(
            percent,
            elapsed = %format_duration(elapsed_secs),
            eta = %format_duration(eta_secs),
            "Transcribing"
        ),
        Notification::AudioLevel { level, .. } => tracing::trace!(level, "Audio level"),
        // `Notification` is #[non_exhaustive]; the compiler requires a wildcard
        // arm even though all current variants are handled above.
        _ => {}
    }
}

/// Print the model catalog with per-model download status.
fn list_models(store: &ModelStore) {
    for model in MODELS {
        let status = if store.is_downloaded(model.id) {
            "downloaded"
        } else {
            "not downloaded"
        };
        println!(
            "{:<10} {:<26} {:>8}  {:<14} {}",
            model.id, model.display_name, model.approx_size, status, model.description
        );
    }
}

/// One-shot `murmur download <id>`: fetch a model's files with progress logs.
async fn download_model(store: &Arc<ModelStore>, model_id: &str) -> murmur_core::Result<()> {
    if murmur_hub::find(model_id).is_none() {
        return Err(MurmurError::UnknownModel(model_id.to_string()));
    }
    if store.is_downloaded(model_id) {
        tracing::info!(model = %model_id, "Model already downloaded");
        return Ok(());
    }

    let store = Arc::clone(store);
    let id = model_id.to_string();
    tokio::task::spawn_blocking(move || {
        store.download(&id, |percent, message| {
            if percent < 0.0 {
                tracing::warn!("{}", message);
            } else {
                tracing::info!(percent, "{}", message);
            }
        })
    })
    .await
    .map_err(|e| MurmurError::Download(format!("Download task failed: {}", e)))??;

    tracing::info!(model = %model_id, "Download complete");
    Ok(())
}

/// Start the controller against real backends and run until interrupted.
async fn run_dictation(
    store: Arc<ModelStore>,
    settings_store: Arc<dyn SettingsStore>,
    model_override: Option<String>,
    hotkey: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = uuid::Uuid::new_v4();
    tracing::info!(session = %session, "Starting Murmur v{}", env!("CARGO_PKG_VERSION"));

    // A --model flag is a selection, so it persists like one.
    if let Some(model_id) = model_override {
        if murmur_hub::find(&model_id).is_none() {
            return Err(MurmurError::UnknownModel(model_id).into());
        }
        let mut settings = Settings::load_or_default(settings_store.as_ref());
        if settings.selected_model != model_id {
            settings.selected_model = model_id;
            settings.save(settings_store.as_ref())?;
        }
    }

    let engine = Arc::new(TranscriptionEngine::new(
        Arc::clone(&store),
        Arc::new(WhisperBackend::new()),
    ));
    let input = Arc::new(CpalInput::new()) as Arc<dyn AudioInput>;
    let capture = CaptureSession::new(input, SAMPLE_RATE);
    let hotkeys = Arc::new(GlobalHotkeyService::new()?) as Arc<dyn HotkeyBackend>;
    let injector =
        Arc::new(EnigoInjector::new().with_key_interval(TYPE_INTERVAL)) as Arc<dyn TextInjector>;

    let (controller, mut notifications) = LifecycleController::new(
        engine,
        store,
        capture,
        hotkeys,
        injector,
        settings_store,
        &hotkey,
    );

    tokio::spawn(async move {
        while let Some(event) = notifications.recv().await {
            render_notification(event);
        }
    });

    controller.initialize()?;
    tracing::info!(hotkey = %display_combo(&hotkey), "Press the hotkey to dictate");

    let runner = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run().await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received, shutting down");
    controller.shutdown();
    runner.await??;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    init_tracing(args.resolve_log_level().as_deref());

    let data_dir = args.resolve_data_dir();
    let hotkey = args.resolve_hotkey();
    let model_override = args.model.clone();
    let command = args.command;

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let store = Arc::new(ModelStore::new(
        data_dir.join("models"),
        Arc::new(HttpHub::new()),
    ));

    match command.unwrap_or(Command::Run) {
        Command::Models => list_models(&store),
        Command::Download { id } => download_model(&store, &id).await?,
        Command::Run => {
            let settings_store = Arc::new(FsStore::new(&data_dir)) as Arc<dyn SettingsStore>;
            run_dictation(store, settings_store, model_override, hotkey).await?;
        }
    }

    Ok(())
}
