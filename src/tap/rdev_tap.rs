//! rdev-backed event tap
//!
//! macOS and Windows use `rdev::grab`, which can swallow events. On Linux
//! rdev only offers `rdev::listen`: hotkeys and capture still work but the
//! focused application also receives every key.
//!
//! On macOS the tap needs Input Monitoring permission. Without it the
//! underlying CGEventTap cannot be created and `grab` returns at once, which
//! `start` reports as [`TapError::PermissionDenied`].

use super::{EventTap, Key, KeyDirection, KeyEvent, ModifierKey, ModifierTracker, TapHandle, TapRouter, Verdict};
use crate::error::TapError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;

/// How long `start` waits for the backend to fail before assuming it runs
const STARTUP_GRACE: Duration = Duration::from_millis(300);

/// Router and modifier state shared with the rdev callback
struct TapState {
    router: TapRouter,
    modifiers: ModifierTracker,
}

impl TapState {
    fn handle(&mut self, event: &rdev::Event) -> Verdict {
        let Some((direction, key)) = classify(&event.event_type) else {
            return Verdict::PassThrough;
        };
        let modifiers = self.modifiers.observe(direction, key);
        let text = match direction {
            KeyDirection::Down => event.name.clone().filter(|s| !s.is_empty()),
            KeyDirection::Up => None,
        };
        let key_event = KeyEvent {
            direction,
            key,
            text,
            modifiers,
        };
        self.router.route(&key_event)
    }
}

/// rdev-based event tap
pub struct RdevTap {
    running: Arc<AtomicBool>,
}

impl RdevTap {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for RdevTap {
    fn default() -> Self {
        Self::new()
    }
}

impl EventTap for RdevTap {
    fn start(&mut self, router: TapRouter) -> Result<TapHandle, TapError> {
        if !crate::permissions::has_input_monitoring() {
            return Err(TapError::PermissionDenied);
        }

        let running = Arc::new(AtomicBool::new(true));
        self.running = running.clone();
        let state = Arc::new(Mutex::new(TapState {
            router,
            modifiers: ModifierTracker::new(),
        }));

        let (failed_tx, failed_rx) = std_mpsc::channel::<String>();
        let thread_running = running.clone();

        let thread = std::thread::Builder::new()
            .name("clippy-tap".to_string())
            .spawn(move || {
                if let Err(e) = run_backend(state, thread_running.clone()) {
                    thread_running.store(false, Ordering::SeqCst);
                    let _ = failed_tx.send(e);
                }
            })
            .map_err(|e| TapError::Backend(format!("Failed to spawn tap thread: {}", e)))?;

        match failed_rx.recv_timeout(STARTUP_GRACE) {
            Ok(reason) => {
                tracing::warn!("Event tap failed to start: {}", reason);
                Err(TapError::PermissionDenied)
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                tracing::info!("Event tap running");
                Ok(TapHandle::new(running, Some(thread)))
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(TapError::Backend(
                "Event tap thread exited without an error".to_string(),
            )),
        }
    }
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn run_backend(state: Arc<Mutex<TapState>>, running: Arc<AtomicBool>) -> Result<(), String> {
    let callback = move |event: rdev::Event| -> Option<rdev::Event> {
        if !running.load(Ordering::SeqCst) {
            return Some(event);
        }
        let verdict = match state.lock() {
            Ok(mut state) => state.handle(&event),
            Err(_) => Verdict::PassThrough,
        };
        match verdict {
            Verdict::Consume => None,
            Verdict::PassThrough => Some(event),
        }
    };

    rdev::grab(callback).map_err(|e| format!("{:?}", e))
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn run_backend(state: Arc<Mutex<TapState>>, running: Arc<AtomicBool>) -> Result<(), String> {
    tracing::warn!(
        "Key events cannot be swallowed on this platform; \
         captured keystrokes also reach the focused application"
    );

    let callback = move |event: rdev::Event| {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(mut state) = state.lock() {
            let _ = state.handle(&event);
        }
    };

    rdev::listen(callback).map_err(|e| format!("{:?}", e))
}

/// Map an rdev event type to a direction and key, ignoring mouse events
fn classify(event_type: &rdev::EventType) -> Option<(KeyDirection, Key)> {
    match event_type {
        rdev::EventType::KeyPress(k) => Some((KeyDirection::Down, map_key(*k))),
        rdev::EventType::KeyRelease(k) => Some((KeyDirection::Up, map_key(*k))),
        _ => None,
    }
}

fn map_key(key: rdev::Key) -> Key {
    use rdev::Key as R;
    match key {
        R::Return | R::KpReturn => Key::Return,
        R::Tab => Key::Tab,
        R::Backspace => Key::Backspace,
        R::Escape => Key::Escape,
        R::Space => Key::Space,
        R::MetaLeft | R::MetaRight => Key::Modifier(ModifierKey::Command),
        R::ControlLeft | R::ControlRight => Key::Modifier(ModifierKey::Control),
        R::Alt | R::AltGr => Key::Modifier(ModifierKey::Option),
        R::ShiftLeft | R::ShiftRight => Key::Modifier(ModifierKey::Shift),
        other => letter_or_digit(other).map(Key::Char).unwrap_or(Key::Other),
    }
}

fn letter_or_digit(key: rdev::Key) -> Option<char> {
    use rdev::Key as R;
    let c = match key {
        R::KeyA => 'a',
        R::KeyB => 'b',
        R::KeyC => 'c',
        R::KeyD => 'd',
        R::KeyE => 'e',
        R::KeyF => 'f',
        R::KeyG => 'g',
        R::KeyH => 'h',
        R::KeyI => 'i',
        R::KeyJ => 'j',
        R::KeyK => 'k',
        R::KeyL => 'l',
        R::KeyM => 'm',
        R::KeyN => 'n',
        R::KeyO => 'o',
        R::KeyP => 'p',
        R::KeyQ => 'q',
        R::KeyR => 'r',
        R::KeyS => 's',
        R::KeyT => 't',
        R::KeyU => 'u',
        R::KeyV => 'v',
        R::KeyW => 'w',
        R::KeyX => 'x',
        R::KeyY => 'y',
        R::KeyZ => 'z',
        R::Num0 => '0',
        R::Num1 => '1',
        R::Num2 => '2',
        R::Num3 => '3',
        R::Num4 => '4',
        R::Num5 => '5',
        R::Num6 => '6',
        R::Num7 => '7',
        R::Num8 => '8',
        R::Num9 => '9',
        _ => return None,
    };
    Some(c)
}
