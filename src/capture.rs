//! Text capture session
//!
//! Reconstructs what the user types between two presses of the capture
//! hotkey. The session is owned by the daemon actor and fed the key events
//! forwarded by the tap.

use crate::tap::{Key, KeyEvent};

/// What a key event did to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Not capturing, or the event does not edit text
    Ignored,
    /// The buffer changed. `typing_started` is true exactly once per session.
    Edited { typing_started: bool },
    /// Escape ended the session without a query
    Cancelled(CaptureOutcome),
}

/// Result of ending a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// The question, or None when nothing was typed or the session was cancelled
    pub query: Option<String>,
    /// Characters committed when the session ended
    pub captured_length: usize,
    pub source_app: Option<String>,
}

/// State of the current (or last) capture
#[derive(Debug, Default)]
pub struct CaptureSession {
    is_active: bool,
    buffer: String,
    has_emitted_typing_signal: bool,
    /// Kept after the session ends, until the replacement completes
    source_app: Option<String>,
    captured_length: usize,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn source_app(&self) -> Option<&str> {
        self.source_app.as_deref()
    }

    pub fn captured_length(&self) -> usize {
        self.captured_length
    }

    /// Start a new session, tearing down any previous one
    pub fn begin(&mut self, source_app: Option<String>) {
        if self.is_active {
            tracing::debug!("Discarding active capture of {} chars", self.buffer.chars().count());
        }
        self.is_active = true;
        self.buffer.clear();
        self.has_emitted_typing_signal = false;
        self.source_app = source_app;
        self.captured_length = 0;
    }

    /// Feed a key event
    pub fn handle_key(&mut self, event: &KeyEvent) -> KeyOutcome {
        if !self.is_active || !event.is_down() || event.modifiers.is_shortcut() {
            return KeyOutcome::Ignored;
        }

        match event.key {
            Key::Escape => return KeyOutcome::Cancelled(self.cancel()),
            Key::Return => self.buffer.push('\n'),
            Key::Tab => self.buffer.push('\t'),
            Key::Backspace => {
                self.buffer.pop();
            }
            Key::Modifier(_) => return KeyOutcome::Ignored,
            Key::Space => self.buffer.push(' '),
            Key::Char(_) | Key::Other => match printable(event.text.as_deref()) {
                Some(text) => self.buffer.push_str(text),
                None => return KeyOutcome::Ignored,
            },
        }

        let typing_started = !self.has_emitted_typing_signal;
        self.has_emitted_typing_signal = true;
        KeyOutcome::Edited { typing_started }
    }

    /// End the session and hand back the question
    pub fn finish(&mut self) -> CaptureOutcome {
        self.captured_length = self.buffer.chars().count();
        let text = std::mem::take(&mut self.buffer);
        self.is_active = false;

        let query = if text.trim().is_empty() { None } else { Some(text) };
        CaptureOutcome {
            query,
            captured_length: self.captured_length,
            source_app: self.source_app.clone(),
        }
    }

    /// End the session without a query
    pub fn cancel(&mut self) -> CaptureOutcome {
        self.buffer.clear();
        self.is_active = false;
        self.captured_length = 0;
        CaptureOutcome {
            query: None,
            captured_length: 0,
            source_app: self.source_app.clone(),
        }
    }

    /// Forget the retained source app once the replacement is done
    pub fn release(&mut self) {
        if !self.is_active {
            self.source_app = None;
            self.captured_length = 0;
        }
    }
}

/// Text from a key event that should land in the buffer
fn printable(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.is_empty() && !t.chars().any(char::is_control))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tap::Modifiers;

    fn press(c: char) -> KeyEvent {
        let s = c.to_string();
        KeyEvent::down(Key::Char(c.to_ascii_lowercase()), Some(&s), Modifiers::default())
    }

    fn key(k: Key) -> KeyEvent {
        KeyEvent::down(k, None, Modifiers::default())
    }

    fn type_str(session: &mut CaptureSession, s: &str) {
        for c in s.chars() {
            if c == ' ' {
                session.handle_key(&key(Key::Space));
            } else {
                session.handle_key(&press(c));
            }
        }
    }

    #[test]
    fn test_typed_text_becomes_query() {
        let mut session = CaptureSession::new();
        session.begin(Some("Mail".to_string()));
        type_str(&mut session, "Where is my Order");
        assert_eq!(session.buffer(), "Where is my Order");

        let outcome = session.finish();
        assert_eq!(outcome.query.as_deref(), Some("Where is my Order"));
        assert_eq!(outcome.captured_length, 17);
        assert_eq!(outcome.source_app.as_deref(), Some("Mail"));
        assert!(!session.is_active());
        assert_eq!(session.buffer(), "");
        assert_eq!(session.source_app(), Some("Mail"));
    }

    #[test]
    fn test_length_accounting_with_backspaces() {
        let mut session = CaptureSession::new();
        session.begin(None);
        type_str(&mut session, "abcdefg"); // N = 7
        for _ in 0..3 {
            session.handle_key(&key(Key::Backspace)); // B = 3
        }
        let outcome = session.finish();
        assert_eq!(outcome.captured_length, 4);
        assert_eq!(outcome.query.as_deref(), Some("abcd"));
    }

    #[test]
    fn test_backspace_on_empty_buffer_is_noop() {
        let mut session = CaptureSession::new();
        session.begin(None);
        session.handle_key(&key(Key::Backspace));
        session.handle_key(&key(Key::Backspace));
        type_str(&mut session, "hi");
        let outcome = session.finish();
        assert_eq!(outcome.captured_length, 2);
    }

    #[test]
    fn test_double_press_without_typing_yields_no_query() {
        let mut session = CaptureSession::new();
        session.begin(None);
        let outcome = session.finish();
        assert_eq!(outcome.query, None);
        assert_eq!(outcome.captured_length, 0);
    }

    #[test]
    fn test_return_and_tab() {
        let mut session = CaptureSession::new();
        session.begin(None);
        type_str(&mut session, "a");
        session.handle_key(&key(Key::Return));
        session.handle_key(&key(Key::Tab));
        type_str(&mut session, "b");
        assert_eq!(session.buffer(), "a\n\tb");
        assert_eq!(session.finish().captured_length, 4);
    }

    #[test]
    fn test_escape_cancels() {
        let mut session = CaptureSession::new();
        session.begin(Some("Notes".to_string()));
        type_str(&mut session, "never mind");
        match session.handle_key(&key(Key::Escape)) {
            KeyOutcome::Cancelled(outcome) => {
                assert_eq!(outcome.query, None);
                assert_eq!(outcome.captured_length, 0);
            }
            other => panic!("expected cancel, got {:?}", other),
        }
        assert!(!session.is_active());
    }

    #[test]
    fn test_shortcuts_and_key_ups_are_ignored() {
        let mut session = CaptureSession::new();
        session.begin(None);
        let cmd_v = KeyEvent::down(
            Key::Char('v'),
            Some("v"),
            Modifiers {
                command: true,
                ..Default::default()
            },
        );
        assert_eq!(session.handle_key(&cmd_v), KeyOutcome::Ignored);
        assert_eq!(
            session.handle_key(&KeyEvent::up(Key::Char('a'), Modifiers::default())),
            KeyOutcome::Ignored
        );
        assert_eq!(session.buffer(), "");
    }

    #[test]
    fn test_shifted_text_and_unicode() {
        let mut session = CaptureSession::new();
        session.begin(None);
        let shifted = KeyEvent::down(
            Key::Char('a'),
            Some("A"),
            Modifiers {
                shift: true,
                ..Default::default()
            },
        );
        session.handle_key(&shifted);
        session.handle_key(&KeyEvent::down(Key::Other, Some("é"), Modifiers::default()));
        assert_eq!(session.buffer(), "Aé");
        assert_eq!(session.finish().captured_length, 2);
    }

    #[test]
    fn test_control_characters_are_not_printable() {
        let mut session = CaptureSession::new();
        session.begin(None);
        let ev = KeyEvent::down(Key::Other, Some("\u{1b}"), Modifiers::default());
        assert_eq!(session.handle_key(&ev), KeyOutcome::Ignored);
        let ev = KeyEvent::down(Key::Other, None, Modifiers::default());
        assert_eq!(session.handle_key(&ev), KeyOutcome::Ignored);
    }

    #[test]
    fn test_typing_started_fires_once_per_session() {
        let mut session = CaptureSession::new();
        session.begin(None);
        assert_eq!(
            session.handle_key(&press('a')),
            KeyOutcome::Edited { typing_started: true }
        );
        assert_eq!(
            session.handle_key(&press('b')),
            KeyOutcome::Edited { typing_started: false }
        );
        session.finish();

        session.begin(None);
        assert_eq!(
            session.handle_key(&press('c')),
            KeyOutcome::Edited { typing_started: true }
        );
    }

    #[test]
    fn test_events_outside_session_are_ignored() {
        let mut session = CaptureSession::new();
        assert_eq!(session.handle_key(&press('a')), KeyOutcome::Ignored);
    }

    #[test]
    fn test_begin_tears_down_previous_session() {
        let mut session = CaptureSession::new();
        session.begin(Some("A".to_string()));
        type_str(&mut session, "old");
        session.begin(Some("B".to_string()));
        assert_eq!(session.buffer(), "");
        assert_eq!(session.source_app(), Some("B"));
        type_str(&mut session, "new");
        assert_eq!(session.finish().query.as_deref(), Some("new"));
        session.release();
        assert_eq!(session.source_app(), None);
    }
}
