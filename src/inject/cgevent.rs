//! macOS key synthesis via CGEvent
//!
//! Posts Core Graphics keyboard events at the HID level. Requires
//! Accessibility permission:
//!   System Settings > Privacy & Security > Accessibility
//!
//! `CGEventSource` is not `Send`; a `CgEventSynth` lives and dies on the
//! blocking thread that performs one replacement.

use super::{bulk_insertable, unicode_chunks, KeySynth, UNICODE_CHUNK_UTF16};
use crate::error::InjectError;
use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation, CGKeyCode};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use std::time::Duration;

// macOS virtual key codes (from Carbon HIToolbox Events.h)
const KEYCODE_RETURN: CGKeyCode = 0x24;
const KEYCODE_TAB: CGKeyCode = 0x30;
const KEYCODE_DELETE: CGKeyCode = 0x33;
const KEYCODE_V: CGKeyCode = 0x09;
const KEYCODE_COMMAND: CGKeyCode = 0x37;
const KEYCODE_SHIFT: CGKeyCode = 0x38;
const KEYCODE_OPTION: CGKeyCode = 0x3A;
const KEYCODE_CONTROL: CGKeyCode = 0x3B;
const KEYCODE_RIGHT_COMMAND: CGKeyCode = 0x36;
const KEYCODE_RIGHT_SHIFT: CGKeyCode = 0x3C;
const KEYCODE_RIGHT_OPTION: CGKeyCode = 0x3D;
const KEYCODE_RIGHT_CONTROL: CGKeyCode = 0x3E;

/// Gap between the Unicode events of one long string
const CHUNK_PAUSE: Duration = Duration::from_millis(2);

/// CGEvent-based key synthesizer
pub struct CgEventSynth {
    source: CGEventSource,
}

impl CgEventSynth {
    pub fn new() -> Result<Self, InjectError> {
        if !crate::permissions::has_accessibility() {
            return Err(InjectError::PermissionDenied);
        }
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| InjectError::InitFailed("Failed to create CGEventSource".into()))?;
        Ok(Self { source })
    }

    fn key_event(&self, keycode: CGKeyCode, down: bool) -> Result<CGEvent, InjectError> {
        CGEvent::new_keyboard_event(self.source.clone(), keycode, down)
            .map_err(|_| InjectError::SynthesisFailed("Failed to create keyboard event".into()))
    }

    /// Post a key with explicit flags so Caps Lock or stuck modifiers
    /// don't leak into synthetic input
    fn post_key(&self, keycode: CGKeyCode, down: bool, flags: CGEventFlags) -> Result<(), InjectError> {
        let event = self.key_event(keycode, down)?;
        event.set_flags(flags);
        event.post(CGEventTapLocation::HID);
        Ok(())
    }

    fn post_string(&self, text: &str, down: bool) -> Result<(), InjectError> {
        let utf16: Vec<u16> = text.encode_utf16().collect();
        let event = self.key_event(0, down)?;
        event.set_flags(CGEventFlags::CGEventFlagNull);
        if down {
            event.set_string_from_utf16_unchecked(&utf16);
        }
        event.post(CGEventTapLocation::HID);
        Ok(())
    }
}

impl KeySynth for CgEventSynth {
    fn release_modifiers(&mut self) -> Result<(), InjectError> {
        for keycode in [
            KEYCODE_COMMAND,
            KEYCODE_RIGHT_COMMAND,
            KEYCODE_SHIFT,
            KEYCODE_RIGHT_SHIFT,
            KEYCODE_OPTION,
            KEYCODE_RIGHT_OPTION,
            KEYCODE_CONTROL,
            KEYCODE_RIGHT_CONTROL,
        ] {
            self.post_key(keycode, false, CGEventFlags::CGEventFlagNull)?;
        }
        Ok(())
    }

    fn backspace(&mut self, down: bool) -> Result<(), InjectError> {
        self.post_key(KEYCODE_DELETE, down, CGEventFlags::CGEventFlagNull)
    }

    fn supports_bulk(&self, text: &str) -> bool {
        bulk_insertable(text)
    }

    /// Many apps truncate the string on a single event, so long text is
    /// posted in chunks
    fn post_unicode(&mut self, text: &str) -> Result<(), InjectError> {
        for (i, chunk) in unicode_chunks(text, UNICODE_CHUNK_UTF16).into_iter().enumerate() {
            if i > 0 {
                std::thread::sleep(CHUNK_PAUSE);
            }
            self.post_string(chunk, true)?;
            self.post_string(chunk, false)?;
        }
        Ok(())
    }

    fn char_key(&mut self, c: char, down: bool) -> Result<(), InjectError> {
        match c {
            '\n' | '\r' => self.post_key(KEYCODE_RETURN, down, CGEventFlags::CGEventFlagNull),
            '\t' => self.post_key(KEYCODE_TAB, down, CGEventFlags::CGEventFlagNull),
            c => {
                let mut buf = [0u8; 4];
                self.post_string(c.encode_utf8(&mut buf), down)
            }
        }
    }

    fn paste_shortcut(&mut self) -> Result<(), InjectError> {
        self.post_key(KEYCODE_V, true, CGEventFlags::CGEventFlagCommand)?;
        self.post_key(KEYCODE_V, false, CGEventFlags::CGEventFlagCommand)
    }
}
