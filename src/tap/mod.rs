//! Global keyboard tap
//!
//! Intercepts key events system-wide and decides, per event, whether the
//! focused application gets to see it. The tap serves two purposes at once:
//!
//! - global modifier+letter hotkeys, always swallowed (down and matching up)
//!   and forwarded to the daemon as [`TapMessage::Hotkey`];
//! - capture mode: while the shared capture gate is open, every key event is
//!   forwarded as [`TapMessage::Key`] for the capture session.
//!
//! The OS-specific part lives in [`rdev_tap`]. Everything in this file is
//! plain data and can be tested without a display server.

pub mod rdev_tap;

use crate::config::HotkeyConfig;
use crate::error::TapError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Key direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

/// Modifier keys tracked by the tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKey {
    Command,
    Control,
    Option,
    Shift,
}

/// Physical key, reduced to what the agent cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Letter or digit key, lowercase
    Char(char),
    Return,
    Tab,
    Backspace,
    Escape,
    Space,
    Modifier(ModifierKey),
    Other,
}

/// Modifier state at the time of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub command: bool,
    pub control: bool,
    pub option: bool,
    pub shift: bool,
}

impl Modifiers {
    /// Command or control held; such events are shortcuts, not typing
    pub fn is_shortcut(&self) -> bool {
        self.command || self.control
    }

    pub fn is_empty(&self) -> bool {
        *self == Modifiers::default()
    }
}

/// A decoded key event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub direction: KeyDirection,
    pub key: Key,
    /// Text the key produces with the current layout, if any
    pub text: Option<String>,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn down(key: Key, text: Option<&str>, modifiers: Modifiers) -> Self {
        Self {
            direction: KeyDirection::Down,
            key,
            text: text.map(str::to_string),
            modifiers,
        }
    }

    pub fn up(key: Key, modifiers: Modifiers) -> Self {
        Self {
            direction: KeyDirection::Up,
            key,
            text: None,
            modifiers,
        }
    }

    pub fn is_down(&self) -> bool {
        self.direction == KeyDirection::Down
    }
}

/// Tracks held modifiers from modifier key-down/key-up events
#[derive(Debug, Default)]
pub struct ModifierTracker {
    state: Modifiers,
}

impl ModifierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the held set and return the state to stamp on the event
    pub fn observe(&mut self, direction: KeyDirection, key: Key) -> Modifiers {
        if let Key::Modifier(m) = key {
            let held = direction == KeyDirection::Down;
            match m {
                ModifierKey::Command => self.state.command = held,
                ModifierKey::Control => self.state.control = held,
                ModifierKey::Option => self.state.option = held,
                ModifierKey::Shift => self.state.shift = held,
            }
        }
        self.state
    }

    pub fn current(&self) -> Modifiers {
        self.state
    }
}

/// A modifier+key hotkey, e.g. "ctrl+alt+k"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chord {
    pub modifiers: Modifiers,
    pub key: char,
}

impl Chord {
    /// Parse a chord string. At least one modifier is required.
    pub fn parse(s: &str) -> Result<Self, TapError> {
        let invalid = || TapError::InvalidChord(s.to_string());
        let mut modifiers = Modifiers::default();
        let mut key = None;

        for part in s.split('+').map(|p| p.trim().to_lowercase()) {
            match part.as_str() {
                "cmd" | "command" | "super" | "meta" | "win" => modifiers.command = true,
                "ctrl" | "control" => modifiers.control = true,
                "alt" | "opt" | "option" => modifiers.option = true,
                "shift" => modifiers.shift = true,
                other => {
                    let mut chars = other.chars();
                    match (chars.next(), chars.next(), key) {
                        (Some(c), None, None) if c.is_ascii_alphanumeric() => key = Some(c),
                        _ => return Err(invalid()),
                    }
                }
            }
        }

        match key {
            Some(key) if !modifiers.is_empty() => Ok(Self { modifiers, key }),
            _ => Err(invalid()),
        }
    }

    /// Whether a key-down event triggers this chord
    pub fn matches(&self, event: &KeyEvent) -> bool {
        event.is_down() && event.key == Key::Char(self.key) && event.modifiers == self.modifiers
    }
}

impl std::fmt::Display for Chord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = &self.modifiers;
        for (held, name) in [
            (m.command, "cmd"),
            (m.control, "ctrl"),
            (m.option, "alt"),
            (m.shift, "shift"),
        ] {
            if held {
                write!(f, "{}+", name)?;
            }
        }
        write!(f, "{}", self.key)
    }
}

/// What a hotkey asks the daemon to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    /// Start capturing, or finish the current capture
    ToggleCapture,
    /// Rank history for the focused app and publish suggestions
    SuggestForApp,
}

/// Hotkey table
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<(Chord, HotkeyAction)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, chord: Chord, action: HotkeyAction) -> Self {
        self.entries.push((chord, action));
        self
    }

    /// Build the table from `[hotkey]` config
    pub fn from_config(config: &HotkeyConfig) -> Result<Self, TapError> {
        let mut bindings = Self::new().bind(Chord::parse(&config.capture)?, HotkeyAction::ToggleCapture);
        if let Some(ref suggest) = config.suggest {
            bindings = bindings.bind(Chord::parse(suggest)?, HotkeyAction::SuggestForApp);
        }
        Ok(bindings)
    }

    pub fn lookup(&self, event: &KeyEvent) -> Option<(Chord, HotkeyAction)> {
        self.entries
            .iter()
            .find(|(chord, _)| chord.matches(event))
            .copied()
    }
}

/// Messages sent from the tap thread to the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapMessage {
    Hotkey(HotkeyAction),
    Key(KeyEvent),
}

/// Per-event decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Consume,
    PassThrough,
}

/// Decides what happens to each event and forwards what the daemon needs
///
/// Runs on the tap thread. It only reads the capture gate and its own
/// bindings; the daemon owns everything else.
pub struct TapRouter {
    bindings: Bindings,
    gate: Arc<AtomicBool>,
    consume_keys: bool,
    tx: mpsc::UnboundedSender<TapMessage>,
    /// Hotkey keys whose key-up still has to be swallowed
    held: Vec<char>,
}

impl TapRouter {
    pub fn new(
        bindings: Bindings,
        gate: Arc<AtomicBool>,
        consume_keys: bool,
        tx: mpsc::UnboundedSender<TapMessage>,
    ) -> Self {
        Self {
            bindings,
            gate,
            consume_keys,
            tx,
            held: Vec::new(),
        }
    }

    pub fn route(&mut self, event: &KeyEvent) -> Verdict {
        if let Some((chord, action)) = self.bindings.lookup(event) {
            if !self.held.contains(&chord.key) {
                self.held.push(chord.key);
            }
            if action == HotkeyAction::ToggleCapture {
                // Open the gate right away so keys typed before the daemon
                // reacts are not lost
                self.gate.fetch_xor(true, Ordering::SeqCst);
            }
            self.send(TapMessage::Hotkey(action));
            return Verdict::Consume;
        }

        if let (KeyDirection::Up, Key::Char(c)) = (event.direction, event.key) {
            if let Some(pos) = self.held.iter().position(|h| *h == c) {
                self.held.remove(pos);
                return Verdict::Consume;
            }
        }

        // Modifiers always reach the app so its own modifier state stays sane
        if matches!(event.key, Key::Modifier(_)) {
            return Verdict::PassThrough;
        }

        if self.gate.load(Ordering::SeqCst) {
            self.send(TapMessage::Key(event.clone()));
            if self.consume_keys {
                return Verdict::Consume;
            }
        }

        Verdict::PassThrough
    }

    fn send(&self, message: TapMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!("Tap message dropped, daemon channel closed");
        }
    }
}

/// A running tap. Dropping it stops routing.
pub struct TapHandle {
    running: Arc<AtomicBool>,
    _thread: Option<std::thread::JoinHandle<()>>,
}

impl TapHandle {
    pub fn new(running: Arc<AtomicBool>, thread: Option<std::thread::JoinHandle<()>>) -> Self {
        Self {
            running,
            _thread: thread,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop routing. Events pass through untouched afterwards; the OS
    /// thread itself lives until process exit.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for TapHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Trait for event tap implementations
pub trait EventTap: Send {
    /// Start intercepting events, routing each through `router`
    fn start(&mut self, router: TapRouter) -> Result<TapHandle, TapError>;
}

/// Factory function to create the platform tap
pub fn create_tap() -> Box<dyn EventTap> {
    Box::new(rdev_tap::RdevTap::new())
}
