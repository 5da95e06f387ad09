//! Global hotkey registration and dispatch.
//!
//! The OS-level manager is owned by a dedicated thread: hotkey APIs are
//! thread-affine on Windows, where registrations only fire on a thread that
//! pumps its message queue. Callers talk to that thread through commands,
//! and presses come back as callback invocations.
//!
//! macOS delivers hotkey events on the main run loop, which a background
//! thread cannot pump; Windows and X11 are the supported platforms here.

use std::sync::{mpsc, Mutex};
use std::time::Duration;

use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use tracing::{debug, info};

use murmur_core::{MurmurError, Result};

/// Callback invoked on the hotkey thread each time the combo is pressed.
pub type PressFn = Box<dyn Fn() + Send + 'static>;

/// Key combo that starts and stops dictation.
pub const DEFAULT_COMBO: &str = "ctrl+space";

/// Global hotkey capability: one registered combo at a time, surfaced as
/// callback invocations.
pub trait HotkeyBackend: Send + Sync {
    /// Registers `combo`, replacing any previous registration. `on_press`
    /// fires once per press until `unregister`.
    fn register(&self, combo: &str, on_press: PressFn) -> Result<()>;

    /// Removes the current registration. A no-op when nothing is registered.
    fn unregister(&self) -> Result<()>;
}

/// Formats a combo string for status lines: `"ctrl+space"` becomes
/// `"Ctrl + Space"`.
pub fn display_combo(combo: &str) -> String {
    combo
        .split('+')
        .map(|part| {
            let mut out = String::new();
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.extend(chars.map(|c| c.to_ascii_lowercase()));
            }
            out
        })
        .collect::<Vec<_>>()
        .join(" + ")
}

enum Command {
    Register {
        combo: String,
        on_press: PressFn,
        reply: mpsc::Sender<Result<()>>,
    },
    Unregister {
        reply: mpsc::Sender<Result<()>>,
    },
    Shutdown,
}

/// [`HotkeyBackend`] backed by the `global-hotkey` crate.
pub struct GlobalHotkeyService {
    commands: Mutex<mpsc::Sender<Command>>,
}

impl GlobalHotkeyService {
    /// Spawns the hotkey thread and creates the OS manager on it.
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("murmur-hotkeys".to_string())
            .spawn(move || hotkey_thread(rx, ready_tx))
            .map_err(|e| MurmurError::Hotkey(format!("failed to spawn hotkey thread: {}", e)))?;
        ready_rx
            .recv()
            .map_err(|_| MurmurError::Hotkey("hotkey thread exited during startup".to_string()))??;
        Ok(Self {
            commands: Mutex::new(tx),
        })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .lock()
            .map_err(|e| MurmurError::Hotkey(format!("hotkey channel mutex poisoned: {}", e)))?
            .send(command)
            .map_err(|_| MurmurError::Hotkey("hotkey thread is gone".to_string()))
    }

    fn roundtrip(&self, build: impl FnOnce(mpsc::Sender<Result<()>>) -> Command) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(build(reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| MurmurError::Hotkey("hotkey thread is gone".to_string()))?
    }
}

impl HotkeyBackend for GlobalHotkeyService {
    fn register(&self, combo: &str, on_press: PressFn) -> Result<()> {
        let combo = combo.to_string();
        self.roundtrip(move |reply| Command::Register {
            combo,
            on_press,
            reply,
        })
    }

    fn unregister(&self) -> Result<()> {
        self.roundtrip(|reply| Command::Unregister { reply })
    }
}

impl Drop for GlobalHotkeyService {
    fn drop(&mut self) {
        let _ = self.send(Command::Shutdown);
    }
}

fn hotkey_thread(commands: mpsc::Receiver<Command>, ready: mpsc::Sender<Result<()>>) {
    let manager = match GlobalHotKeyManager::new() {
        Ok(manager) => {
            let _ = ready.send(Ok(()));
            manager
        }
        Err(e) => {
            let _ = ready.send(Err(MurmurError::Hotkey(format!(
                "Failed to create hotkey manager: {}",
                e
            ))));
            return;
        }
    };

    let mut current: Option<(HotKey, PressFn)> = None;
    loop {
        match commands.recv_timeout(Duration::from_millis(20)) {
            Ok(Command::Register {
                combo,
                on_press,
                reply,
            }) => {
                let _ = reply.send(register_combo(&manager, &mut current, &combo, on_press));
            }
            Ok(Command::Unregister { reply }) => {
                let _ = reply.send(unregister_combo(&manager, &mut current));
            }
            Ok(Command::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        #[cfg(target_os = "windows")]
        pump_messages();

        while let Ok(event) = GlobalHotKeyEvent::receiver().try_recv() {
            if let Some((hotkey, on_press)) = &current {
                if event.id() == hotkey.id() && event.state() == HotKeyState::Pressed {
                    debug!("Hotkey pressed");
                    on_press();
                }
            }
        }
    }

    let _ = unregister_combo(&manager, &mut current);
}

fn register_combo(
    manager: &GlobalHotKeyManager,
    current: &mut Option<(HotKey, PressFn)>,
    combo: &str,
    on_press: PressFn,
) -> Result<()> {
    use std::str::FromStr;

    let hotkey = HotKey::from_str(combo)
        .map_err(|e| MurmurError::Hotkey(format!("Failed to parse hotkey '{}': {}", combo, e)))?;

    if current.is_some() {
        unregister_combo(manager, current)?;
    }
    manager
        .register(hotkey)
        .map_err(|e| MurmurError::Hotkey(format!("Failed to register hotkey '{}': {}", combo, e)))?;
    info!(key = %combo, "Global hotkey registered");
    *current = Some((hotkey, on_press));
    Ok(())
}

fn unregister_combo(
    manager: &GlobalHotKeyManager,
    current: &mut Option<(HotKey, PressFn)>,
) -> Result<()> {
    if let Some((hotkey, _)) = current.take() {
        manager
            .unregister(hotkey)
            .map_err(|e| MurmurError::Hotkey(format!("Failed to unregister hotkey: {}", e)))?;
        info!("Global hotkey unregistered");
    }
    Ok(())
}

#[cfg(target_os = "windows")]
fn pump_messages() {
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
    };

    // SAFETY: MSG is plain data filled in by PeekMessageW; dispatching only
    // touches messages queued for this thread.
    unsafe {
        let mut msg: MSG = std::mem::zeroed();
        while PeekMessageW(&mut msg, 0, 0, 0, PM_REMOVE) != 0 {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

/// Test double that records registrations and lets tests press the combo
/// programmatically.
#[derive(Default)]
pub struct MockHotkeys {
    callback: Mutex<Option<PressFn>>,
    combo: Mutex<Option<String>>,
    fail_register: bool,
}

impl MockHotkeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `register` call fail.
    pub fn failing() -> Self {
        Self {
            fail_register: true,
            ..Self::default()
        }
    }

    /// Currently registered combo, if any.
    pub fn registered_combo(&self) -> Option<String> {
        self.combo.lock().expect("mock mutex poisoned").clone()
    }

    /// Fires the registered callback, as the OS would on a press.
    pub fn press(&self) {
        if let Some(on_press) = &*self.callback.lock().expect("mock mutex poisoned") {
            on_press();
        }
    }
}

impl HotkeyBackend for MockHotkeys {
    fn register(&self, combo: &str, on_press: PressFn) -> Result<()> {
        if self.fail_register {
            return Err(MurmurError::Hotkey(
                "mock registration failure".to_string(),
            ));
        }
        *self.callback.lock().expect("mock mutex poisoned") = Some(on_press);
        *self.combo.lock().expect("mock mutex poisoned") = Some(combo.to_string());
        Ok(())
    }

    fn unregister(&self) -> Result<()> {
        *self.callback.lock().expect("mock mutex poisoned") = None;
        *self.combo.lock().expect("mock mutex poisoned") = None;
        Ok(())
    }
}
