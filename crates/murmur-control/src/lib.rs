//! Murmur control crate - the dictation lifecycle.
//!
//! [`LifecycleController`] ties the pieces together: a global hotkey toggles
//! capture, finished recordings flow through the transcription engine, and
//! the transcript is typed into the focused window. Every state change and
//! progress report leaves the controller as a [`murmur_core::Notification`]
//! so frontends stay decoupled from the machinery.

pub mod controller;
pub mod hotkey;
pub mod inject;
pub mod message;
pub mod progress;
pub mod state;

pub use controller::LifecycleController;
pub use hotkey::{
    display_combo, GlobalHotkeyService, HotkeyBackend, MockHotkeys, PressFn, DEFAULT_COMBO,
};
pub use inject::{EnigoInjector, MockInjector, TextInjector};
pub use message::WorkerMessage;
pub use progress::EtaTracker;
pub use state::StateCell;
