//! Typing transcribed text into the focused application.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use enigo::{Direction, Enigo, Key, Keyboard};
use tracing::info;

use murmur_core::{MurmurError, Result};

/// Pause before the first keystroke, giving the target window time to take
/// focus after the hotkey release.
const DELAY_BEFORE: Duration = Duration::from_millis(100);

/// Default pause between keystrokes.
const KEY_INTERVAL: Duration = Duration::from_millis(10);

/// Types text into whatever application currently has keyboard focus.
pub trait TextInjector: Send + Sync {
    fn type_text(&self, text: &str) -> Result<()>;
}

/// [`TextInjector`] that synthesizes per-character key events through the
/// `enigo` input library.
///
/// A fresh `Enigo` handle is created per call; the handle is not required to
/// be thread-safe and typing happens from worker threads.
#[derive(Debug, Clone)]
pub struct EnigoInjector {
    key_interval: Duration,
}

impl Default for EnigoInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl EnigoInjector {
    pub fn new() -> Self {
        Self {
            key_interval: KEY_INTERVAL,
        }
    }

    /// Overrides the pause between keystrokes.
    pub fn with_key_interval(mut self, interval: Duration) -> Self {
        self.key_interval = interval;
        self
    }
}

impl TextInjector for EnigoInjector {
    fn type_text(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        let mut enigo = Enigo::new(&enigo::Settings::default())
            .map_err(|e| MurmurError::Inject(format!("failed to initialize input driver: {}", e)))?;

        // Give the target window a beat to regain focus.
        std::thread::sleep(DELAY_BEFORE);

        for ch in text.chars() {
            enigo
                .key(Key::Unicode(ch), Direction::Click)
                .map_err(|e| MurmurError::Inject(format!("failed to type character: {}", e)))?;
            std::thread::sleep(self.key_interval);
        }

        info!(chars = text.chars().count(), "Text injected");
        Ok(())
    }
}

/// Test double that records every string it is asked to type.
#[derive(Default)]
pub struct MockInjector {
    typed: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl MockInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `type_text` call fail.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every string passed to `type_text`, in call order.
    pub fn typed(&self) -> Vec<String> {
        self.typed.lock().expect("mock mutex poisoned").clone()
    }
}

impl TextInjector for MockInjector {
    fn type_text(&self, text: &str) -> Result<()> {
        if self.fail {
            return Err(MurmurError::Inject("mock typing failure".to_string()));
        }
        self.typed
            .lock()
            .expect("mock mutex poisoned")
            .push(text.to_string());
        Ok(())
    }
}
