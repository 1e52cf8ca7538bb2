//! Key synthesis via enigo (Linux, Windows)
//!
//! On Linux enigo talks to X11 through libxdo-style calls; Wayland sessions
//! need XWayland for synthetic input to reach native windows.

use super::KeySynth;
use crate::error::InjectError;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};

/// enigo-based key synthesizer
pub struct EnigoSynth {
    enigo: Enigo,
}

impl EnigoSynth {
    pub fn new() -> Result<Self, InjectError> {
        let enigo =
            Enigo::new(&Settings::default()).map_err(|e| InjectError::InitFailed(e.to_string()))?;
        Ok(Self { enigo })
    }

    fn key(&mut self, key: Key, direction: Direction) -> Result<(), InjectError> {
        self.enigo
            .key(key, direction)
            .map_err(|e| InjectError::SynthesisFailed(e.to_string()))
    }
}

fn direction(down: bool) -> Direction {
    if down {
        Direction::Press
    } else {
        Direction::Release
    }
}

impl KeySynth for EnigoSynth {
    fn release_modifiers(&mut self) -> Result<(), InjectError> {
        for key in [Key::Shift, Key::Control, Key::Alt, Key::Meta] {
            self.key(key, Direction::Release)?;
        }
        Ok(())
    }

    fn backspace(&mut self, down: bool) -> Result<(), InjectError> {
        self.key(Key::Backspace, direction(down))
    }

    /// enigo types arbitrary text in one call
    fn supports_bulk(&self, _text: &str) -> bool {
        true
    }

    fn post_unicode(&mut self, text: &str) -> Result<(), InjectError> {
        self.enigo
            .text(text)
            .map_err(|e| InjectError::SynthesisFailed(e.to_string()))
    }

    fn char_key(&mut self, c: char, down: bool) -> Result<(), InjectError> {
        let key = match c {
            '\n' | '\r' => Key::Return,
            '\t' => Key::Tab,
            c => Key::Unicode(c),
        };
        self.key(key, direction(down))
    }

    fn paste_shortcut(&mut self) -> Result<(), InjectError> {
        self.key(Key::Control, Direction::Press)?;
        let result = self.key(Key::Unicode('v'), Direction::Click);
        self.key(Key::Control, Direction::Release)?;
        result
    }
}
