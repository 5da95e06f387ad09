use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MurmurError, Result};

/// File name of the user settings document.
pub const SETTINGS_FILE: &str = "settings.json";

/// Durable storage for named JSON documents.
///
/// The controller and estimator are handed a store at construction rather
/// than reaching for a fixed path themselves, so tests run against
/// [`MemoryStore`] and the application against [`FsStore`].
pub trait SettingsStore: Send + Sync {
    /// Read the raw contents of a named document, `None` if it does not exist.
    fn read(&self, name: &str) -> Result<Option<String>>;

    /// Durably replace the contents of a named document.
    fn write(&self, name: &str, contents: &str) -> Result<()>;
}

/// Filesystem-backed store rooted at a per-user settings directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The default per-user settings directory
    /// (`%APPDATA%\murmur` on Windows, `~/.config/murmur` elsewhere).
    pub fn default_dir() -> PathBuf {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("murmur")
    }

    /// The directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Default for FsStore {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

impl SettingsStore for FsStore {
    fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, name: &str, contents: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        std::fs::write(&path, contents)?;
        Ok(())
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a document, e.g. a corrupt payload for fallback tests.
    pub fn with_doc(self, name: &str, contents: &str) -> Self {
        self.docs
            .lock()
            .expect("settings mutex poisoned")
            .insert(name.to_string(), contents.to_string());
        self
    }
}

impl SettingsStore for MemoryStore {
    fn read(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .docs
            .lock()
            .map_err(|e| MurmurError::Settings(format!("Store mutex poisoned: {}", e)))?
            .get(name)
            .cloned())
    }

    fn write(&self, name: &str, contents: &str) -> Result<()> {
        self.docs
            .lock()
            .map_err(|e| MurmurError::Settings(format!("Store mutex poisoned: {}", e)))?
            .insert(name.to_string(), contents.to_string());
        Ok(())
    }
}

/// User-facing settings persisted in `settings.json`.
///
/// Unknown keys in the stored document are ignored and missing keys fall
/// back to defaults, so documents written by older or newer builds load
/// cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Identifier of the model used for transcription.
    pub selected_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            selected_model: "base".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the store, falling back to defaults if the
    /// document is absent or cannot be parsed. Never returns an error.
    pub fn load_or_default(store: &dyn SettingsStore) -> Self {
        match store.read(SETTINGS_FILE) {
            Ok(Some(contents)) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Failed to parse {}: {}. Using defaults.", SETTINGS_FILE, e);
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("Failed to read {}: {}. Using defaults.", SETTINGS_FILE, e);
                Self::default()
            }
        }
    }

    /// Save settings to the store.
    pub fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        store.write(SETTINGS_FILE, &contents)?;
        info!(model = %self.selected_model, "Settings saved");
        Ok(())
    }
}
