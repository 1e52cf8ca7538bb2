//! arboard pasteboard backend
//!
//! arboard exposes no change counter, so one is derived: every call to
//! `change_count` reads the current payload, hashes it, and bumps the
//! counter when the hash differs from the last one seen. Writes made through
//! this backend record the hash of what the clipboard holds afterwards, so
//! they never count as a change.
//!
//! A fresh `arboard::Clipboard` is opened per call. Holding one open keeps
//! an X11 selection-owner thread alive on Linux and is not `Send` on every
//! platform.

use super::{ClipboardPayload, Pasteboard};
use crate::error::ClipboardError;
use arboard::{Clipboard, ImageData};
use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// System clipboard through arboard
#[derive(Debug, Default)]
pub struct ArboardPasteboard {
    counter: u64,
    fingerprint: Option<u64>,
    /// Payload read by the last `change_count`, handed out by `read`
    snapshot: Option<ClipboardPayload>,
}

impl ArboardPasteboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn open() -> Result<Clipboard, ClipboardError> {
        Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))
    }

    /// Image first, then text
    fn read_system() -> Result<Option<ClipboardPayload>, ClipboardError> {
        let mut clipboard = Self::open()?;

        if let Ok(image) = clipboard.get_image() {
            if image.width > 0 && image.height > 0 {
                return Ok(Some(ClipboardPayload::Image {
                    width: image.width as u32,
                    height: image.height as u32,
                    rgba: image.bytes.into_owned(),
                }));
            }
        }

        match clipboard.get_text() {
            Ok(text) => Ok(Some(ClipboardPayload::Text(text))),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(ClipboardError::Unavailable(e.to_string())),
        }
    }
}

/// Stable hash of a payload
pub fn fingerprint(payload: Option<&ClipboardPayload>) -> u64 {
    let mut hasher = DefaultHasher::new();
    match payload {
        None => 0u8.hash(&mut hasher),
        Some(ClipboardPayload::Text(text)) => {
            1u8.hash(&mut hasher);
            text.hash(&mut hasher);
        }
        Some(ClipboardPayload::Image {
            width,
            height,
            rgba,
        }) => {
            2u8.hash(&mut hasher);
            width.hash(&mut hasher);
            height.hash(&mut hasher);
            rgba.hash(&mut hasher);
        }
    }
    hasher.finish()
}

/// Hash to remember after a write. Platforms may convert what was written
/// (images get re-encoded), so the read-back wins when there is one.
fn fingerprint_after_write(
    written: &ClipboardPayload,
    read_back: Result<Option<ClipboardPayload>, ClipboardError>,
) -> u64 {
    match read_back {
        Ok(Some(payload)) => fingerprint(Some(&payload)),
        Ok(None) => fingerprint(Some(written)),
        Err(e) => {
            tracing::debug!("Could not read back clipboard write: {}", e);
            fingerprint(Some(written))
        }
    }
}

impl Pasteboard for ArboardPasteboard {
    fn change_count(&mut self) -> Result<u64, ClipboardError> {
        let payload = Self::read_system()?;
        let hash = fingerprint(payload.as_ref());
        if self.fingerprint != Some(hash) {
            self.fingerprint = Some(hash);
            self.counter += 1;
        }
        self.snapshot = payload;
        Ok(self.counter)
    }

    fn read(&mut self) -> Result<Option<ClipboardPayload>, ClipboardError> {
        match self.snapshot.take() {
            Some(payload) => Ok(Some(payload)),
            None => Self::read_system(),
        }
    }

    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        Self::open()?
            .set_text(text.to_string())
            .map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
        let written = ClipboardPayload::Text(text.to_string());
        self.fingerprint = Some(fingerprint_after_write(&written, Self::read_system()));
        Ok(())
    }

    fn write_image(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<(), ClipboardError> {
        let image = ImageData {
            width: width as usize,
            height: height as usize,
            bytes: Cow::Borrowed(rgba),
        };
        Self::open()?
            .set_image(image)
            .map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
        let written = ClipboardPayload::Image {
            width,
            height,
            rgba: rgba.to_vec(),
        };
        self.fingerprint = Some(fingerprint_after_write(&written, Self::read_system()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_distinguishes_payloads() {
        let a = ClipboardPayload::Text("hello".to_string());
        let b = ClipboardPayload::Text("hello!".to_string());
        assert_eq!(fingerprint(Some(&a)), fingerprint(Some(&a.clone())));
        assert_ne!(fingerprint(Some(&a)), fingerprint(Some(&b)));
        assert_ne!(fingerprint(Some(&a)), fingerprint(None));

        let img = ClipboardPayload::Image {
            width: 1,
            height: 1,
            rgba: vec![0, 0, 0, 255],
        };
        assert_ne!(fingerprint(Some(&img)), fingerprint(Some(&a)));
    }

    #[test]
    fn test_write_remembers_converted_image() {
        let written = ClipboardPayload::Image {
            width: 1,
            height: 1,
            rgba: vec![10, 20, 30, 255],
        };
        // Colour management changed the pixel on the way in
        let converted = ClipboardPayload::Image {
            width: 1,
            height: 1,
            rgba: vec![11, 20, 29, 255],
        };

        let remembered = fingerprint_after_write(&written, Ok(Some(converted.clone())));
        assert_eq!(remembered, fingerprint(Some(&converted)));
        assert_ne!(remembered, fingerprint(Some(&written)));

        let unreadable = fingerprint_after_write(
            &written,
            Err(ClipboardError::Unavailable("busy".to_string())),
        );
        assert_eq!(unreadable, fingerprint(Some(&written)));
        assert_eq!(fingerprint_after_write(&written, Ok(None)), fingerprint(Some(&written)));
    }
}
